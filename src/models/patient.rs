use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub patient_id: String,
    pub last_name: String,
    pub first_name: String,
    pub date_of_birth: NaiveDate,
    pub phone: String,
    pub email: Option<String>,
    pub city: Option<String>,
    /// Hospital code of the patient's reference hospital.
    pub primary_hospital: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Vec<String>,
    pub chronic_conditions: Vec<String>,
    pub emergency_contact: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn age_on(&self, today: NaiveDate) -> u32 {
        today.years_since(self.date_of_birth).unwrap_or(0)
    }
}

/// Row shape of the patient list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: Uuid,
    pub patient_id: String,
    pub last_name: String,
    pub first_name: String,
    pub phone: String,
    pub city: Option<String>,
    pub primary_hospital: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Patient> for PatientSummary {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            patient_id: patient.patient_id,
            last_name: patient.last_name,
            first_name: patient.first_name,
            phone: patient.phone,
            city: patient.city,
            primary_hospital: patient.primary_hospital,
            is_active: patient.is_active,
            created_at: patient.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientRef {
    pub patient_id: String,
    pub last_name: String,
    pub first_name: String,
}

impl From<&Patient> for PatientRef {
    fn from(patient: &Patient) -> Self {
        Self {
            patient_id: patient.patient_id.clone(),
            last_name: patient.last_name.clone(),
            first_name: patient.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPatientRequest {
    pub patient_id: Option<String>,
    #[validate(length(min = 1, message = "lastName is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "firstName is required"))]
    pub first_name: String,
    pub date_of_birth: NaiveDate,
    #[validate(length(min = 6, message = "phone is required"))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    pub city: Option<String>,
    pub primary_hospital: Option<String>,
    pub blood_group: Option<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub chronic_conditions: Vec<String>,
    pub emergency_contact: Option<String>,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

/// Insert payload; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewPatient {
    pub patient_id: String,
    pub last_name: String,
    pub first_name: String,
    pub date_of_birth: NaiveDate,
    pub phone: String,
    pub email: Option<String>,
    pub city: Option<String>,
    pub primary_hospital: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Vec<String>,
    pub chronic_conditions: Vec<String>,
    pub emergency_contact: Option<String>,
    pub password_hash: String,
}

impl NewPatient {
    pub fn from_request(request: RegisterPatientRequest, patient_id: String, password_hash: String) -> Self {
        Self {
            patient_id,
            last_name: request.last_name.trim().to_string(),
            first_name: request.first_name.trim().to_string(),
            date_of_birth: request.date_of_birth,
            phone: request.phone,
            email: request.email.map(|e| e.to_lowercase()),
            city: request.city,
            primary_hospital: request.primary_hospital,
            blood_group: request.blood_group,
            allergies: request.allergies,
            chronic_conditions: request.chronic_conditions,
            emergency_contact: request.emergency_contact,
            password_hash,
        }
    }
}

/// Fields a patient (or an administrator) may change after registration.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdate {
    #[validate(length(min = 6))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub city: Option<String>,
    pub primary_hospital: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Option<Vec<String>>,
    pub chronic_conditions: Option<Vec<String>>,
    pub emergency_contact: Option<String>,
}

impl PatientUpdate {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none()
            && self.email.is_none()
            && self.city.is_none()
            && self.primary_hospital.is_none()
            && self.blood_group.is_none()
            && self.allergies.is_none()
            && self.chronic_conditions.is_none()
            && self.emergency_contact.is_none()
    }

    pub fn apply(self, patient: &mut Patient) {
        if let Some(phone) = self.phone {
            patient.phone = phone;
        }
        if let Some(email) = self.email {
            patient.email = Some(email.to_lowercase());
        }
        if let Some(city) = self.city {
            patient.city = Some(city);
        }
        if let Some(hospital) = self.primary_hospital {
            patient.primary_hospital = Some(hospital);
        }
        if let Some(group) = self.blood_group {
            patient.blood_group = Some(group);
        }
        if let Some(allergies) = self.allergies {
            patient.allergies = allergies;
        }
        if let Some(conditions) = self.chronic_conditions {
            patient.chronic_conditions = conditions;
        }
        if let Some(contact) = self.emergency_contact {
            patient.emergency_contact = Some(contact);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Patient {
        Patient {
            id: Uuid::new_v4(),
            patient_id: "BJ20250001".into(),
            last_name: "KOSSOU".into(),
            first_name: "Adjoa".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 3, 15).unwrap(),
            phone: "+229 97 11 11 11".into(),
            email: None,
            city: Some("Cotonou".into()),
            primary_hospital: Some("CHU-MEL".into()),
            blood_group: Some("O+".into()),
            allergies: vec!["Pénicilline".into()],
            chronic_conditions: vec![],
            emergency_contact: None,
            password_hash: "secret-hash".into(),
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["patientId"], "BJ20250001");
    }

    #[test]
    fn age_counts_completed_years() {
        let patient = sample();
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()), 34);
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()), 35);
    }

    #[test]
    fn update_only_touches_provided_fields() {
        let mut patient = sample();
        let update = PatientUpdate {
            email: Some("Adjoa@Example.com".into()),
            allergies: Some(vec![]),
            ..Default::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut patient);
        assert_eq!(patient.email.as_deref(), Some("adjoa@example.com"));
        assert!(patient.allergies.is_empty());
        assert_eq!(patient.city.as_deref(), Some("Cotonou"));
    }
}
