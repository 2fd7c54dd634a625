use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub city: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub director: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Compact hospital reference embedded in doctor and consultation views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HospitalRef {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub city: String,
}

impl From<&Hospital> for HospitalRef {
    fn from(hospital: &Hospital) -> Self {
        Self {
            id: hospital.id,
            code: hospital.code.clone(),
            name: hospital.name.clone(),
            city: hospital.city.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewHospital {
    #[validate(length(min = 2, max = 32))]
    pub code: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub city: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub director: Option<String>,
}

impl NewHospital {
    /// Hospital codes are matched case-insensitively at login, so they are stored upper-case.
    /// Validate the normalized value; padding alone must not satisfy the length rules.
    pub fn normalized(mut self) -> Self {
        self.code = self.code.trim().to_uppercase();
        self.name = self.name.trim().to_string();
        self.city = self.city.trim().to_string();
        self
    }
}
