use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCounts {
    pub hospitals: i64,
    pub doctors: i64,
    pub patients: i64,
    pub consultations: i64,
    pub permissions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationStatistics {
    pub total: i64,
    pub this_month: i64,
    pub previous_month: i64,
    pub growth_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientStatistics {
    pub total: i64,
    pub active: i64,
    pub new_this_month: i64,
    pub new_previous_month: i64,
    pub growth_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoctorStatistics {
    pub total: i64,
    pub active: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStatistics {
    pub month_start: DateTime<Utc>,
    pub consultations: ConsultationStatistics,
    pub patients: PatientStatistics,
    pub doctors: DoctorStatistics,
    pub hospitals: i64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    ConsultationRecorded,
    PatientRegistered,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub kind: ActivityKind,
    pub reference: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotPeriod {
    Daily,
    Weekly,
    #[default]
    Monthly,
}

impl SnapshotPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotPeriod::Daily => "daily",
            SnapshotPeriod::Weekly => "weekly",
            SnapshotPeriod::Monthly => "monthly",
        }
    }
}

impl FromStr for SnapshotPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(SnapshotPeriod::Daily),
            "weekly" => Ok(SnapshotPeriod::Weekly),
            "monthly" => Ok(SnapshotPeriod::Monthly),
            other => Err(format!("unknown statistics period: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub id: Uuid,
    pub period: SnapshotPeriod,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
