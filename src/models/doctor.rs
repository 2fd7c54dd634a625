use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::hospital::HospitalRef;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    pub doctor_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub specialty: String,
    pub department: Option<String>,
    pub hospital_id: Uuid,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorView {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub hospital: HospitalRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoctorRef {
    pub first_name: String,
    pub last_name: String,
    pub specialty: String,
}

impl From<&Doctor> for DoctorRef {
    fn from(doctor: &Doctor) -> Self {
        Self {
            first_name: doctor.first_name.clone(),
            last_name: doctor.last_name.clone(),
            specialty: doctor.specialty.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDoctorRequest {
    pub doctor_id: Option<String>,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 1))]
    pub specialty: String,
    pub department: Option<String>,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct NewDoctor {
    pub doctor_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub specialty: String,
    pub department: Option<String>,
    pub hospital_id: Uuid,
    pub password_hash: String,
}
