use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::doctor::DoctorRef;
use super::hospital::HospitalRef;
use super::patient::PatientRef;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsultationStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Scheduled => "SCHEDULED",
            ConsultationStatus::InProgress => "IN_PROGRESS",
            ConsultationStatus::Completed => "COMPLETED",
            ConsultationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(ConsultationStatus::Scheduled),
            "IN_PROGRESS" => Ok(ConsultationStatus::InProgress),
            "COMPLETED" => Ok(ConsultationStatus::Completed),
            "CANCELLED" => Ok(ConsultationStatus::Cancelled),
            other => Err(format!("unknown consultation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    /// Systolic/diastolic in mmHg, e.g. "120/80".
    pub blood_pressure: Option<String>,
    pub temperature_c: Option<f64>,
    pub pulse: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: Uuid,
    pub consultation_id: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub consulted_at: DateTime<Utc>,
    pub kind: String,
    pub reason: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub prescribed_exams: Vec<String>,
    pub vitals: Vitals,
    pub status: ConsultationStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Consultation {
    pub fn has_active_prescription(&self) -> bool {
        self.status != ConsultationStatus::Cancelled
            && self.prescription.as_deref().map_or(false, |p| !p.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationView {
    #[serde(flatten)]
    pub consultation: Consultation,
    pub patient: PatientRef,
    pub doctor: DoctorRef,
    pub hospital: HospitalRef,
}

/// Narrows a consultation listing; unset fields do not filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsultationFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub hospital_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateConsultationRequest {
    /// External patient identifier (e.g. `BJ20250001`).
    #[validate(length(min = 1))]
    pub patient_id: String,
    #[validate(length(min = 1))]
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    #[serde(default)]
    pub prescribed_exams: Vec<String>,
    #[serde(default)]
    pub vitals: Vitals,
    pub notes: Option<String>,
    #[serde(default)]
    pub status: ConsultationStatus,
    pub consulted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewConsultation {
    pub consultation_id: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub consulted_at: DateTime<Utc>,
    pub kind: String,
    pub reason: Option<String>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub prescribed_exams: Vec<String>,
    pub vitals: Vitals,
    pub status: ConsultationStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ConsultationStatus,
}
