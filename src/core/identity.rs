//! Patient, doctor and consultation identifiers, USSD short codes and patient cards.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::Patient;

pub const PATIENT_ID_PREFIX: &str = "BJ";
pub const USSD_SERVICE: &str = "789";

/// `BJ` + year + a zero-padded sequence in 1..=9999, e.g. `BJ20250042`.
pub fn generate_patient_id<R: Rng + ?Sized>(year: i32, rng: &mut R) -> String {
    let sequence: u32 = rng.gen_range(1..=9999);
    format!("{}{:04}{:04}", PATIENT_ID_PREFIX, year, sequence)
}

/// Patient IDs are case-insensitive on input and stored uppercase.
pub fn normalize_patient_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Matches `^BJ\d{8}$`.
pub fn is_valid_patient_id(candidate: &str) -> bool {
    candidate
        .strip_prefix(PATIENT_ID_PREFIX)
        .map_or(false, |digits| digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_digit()))
}

pub fn generate_consultation_id<R: Rng + ?Sized>(now: DateTime<Utc>, rng: &mut R) -> String {
    let serial: u32 = rng.gen_range(0..1_000_000);
    format!("CONS-{}-{:06}", now.year(), serial)
}

/// Next `MED-<code>-NNNN` for a hospital, one past the highest sequence
/// already in use so hand-picked IDs in the same series are skipped.
pub fn next_doctor_sequence<'a>(hospital_code: &str, existing: impl IntoIterator<Item = &'a str>) -> u32 {
    let prefix = format!("MED-{}-", hospital_code);
    let mut count = 0;
    let mut highest = 0;
    for id in existing {
        count += 1;
        let sequence = id
            .strip_prefix(&prefix)
            .and_then(|suffix| suffix.parse::<u32>().ok())
            .unwrap_or(0);
        highest = highest.max(sequence);
    }
    highest.max(count) + 1
}

pub fn doctor_id(hospital_code: &str, sequence: u32) -> String {
    format!("MED-{}-{:04}", hospital_code, sequence)
}

pub fn ussd_code(patient_id: &str) -> String {
    format!("*{}*{}#", USSD_SERVICE, patient_id)
}

/// Data the patient carries: their ID, the USSD short code and the QR payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientCard {
    pub patient_id: String,
    pub ussd_code: String,
    /// JSON text the client renders as a QR code.
    pub qr_payload: String,
}

impl PatientCard {
    pub fn for_patient(patient: &Patient, issued_at: DateTime<Utc>) -> Self {
        let payload = json!({
            "patientId": patient.patient_id,
            "lastName": patient.last_name,
            "firstName": patient.first_name,
            "hospital": patient.primary_hospital,
            "timestamp": issued_at.timestamp_millis(),
        });
        Self {
            patient_id: patient.patient_id.clone(),
            ussd_code: ussd_code(&patient.patient_id),
            qr_payload: payload.to_string(),
        }
    }
}
