//! Stateless USSD menu for feature phones.
//!
//! The gateway posts the whole input history on every step (`text` is the
//! `*`-joined list of answers), so each reply is computed from scratch.

use serde::Deserialize;

use super::identity::{is_valid_patient_id, normalize_patient_id, USSD_SERVICE};
use crate::db::{Store, StoreResult};
use crate::models::{ConsultationFilter, Patient};

/// Longest message a USSD screen can carry.
pub const MAX_REPLY_CHARS: usize = 182;
const HISTORY_LIMIT: i64 = 3;
const NOT_RECOGNISED: &str = "Patient ID not recognised for this phone number";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UssdRequest {
    #[serde(default)]
    pub session_id: String,
    pub service_code: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UssdReply {
    Continue(String),
    End(String),
}

impl UssdReply {
    pub fn render(&self) -> String {
        let (prefix, body) = match self {
            UssdReply::Continue(body) => ("CON ", body),
            UssdReply::End(body) => ("END ", body),
        };
        let mut out = String::with_capacity(MAX_REPLY_CHARS);
        out.push_str(prefix);
        out.extend(body.chars().take(MAX_REPLY_CHARS - prefix.len()));
        out
    }
}

/// Patient ID embedded in `*789*<id>#`, if any.
fn patient_from_service_code(service_code: &str) -> Option<&str> {
    let inner = service_code.trim().strip_prefix('*')?.strip_suffix('#')?;
    let (service, rest) = inner.split_once('*')?;
    (service == USSD_SERVICE && !rest.is_empty()).then_some(rest)
}

/// Digits only, so `+229 97 11 11 11` and `+22997111111` compare equal.
fn phone_digits(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

fn same_phone(registered: &str, caller: &str) -> bool {
    let caller = phone_digits(caller);
    !caller.is_empty() && phone_digits(registered) == caller
}

fn inputs(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        text.split('*').map(str::trim).collect()
    }
}

fn main_menu(patient: &Patient) -> UssdReply {
    UssdReply::Continue(format!(
        "Hedera Health ID\n{}\n1. Recent consultations\n2. Active prescriptions\n3. Emergency card\n0. Quit",
        patient.full_name()
    ))
}

fn emergency_card(patient: &Patient) -> UssdReply {
    let list = |items: &[String]| {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(", ")
        }
    };
    UssdReply::End(format!(
        "{} ({})\nBlood: {}\nAllergies: {}\nConditions: {}\nContact: {}",
        patient.full_name(),
        patient.patient_id,
        patient.blood_group.as_deref().unwrap_or("unknown"),
        list(&patient.allergies),
        list(&patient.chronic_conditions),
        patient.emergency_contact.as_deref().unwrap_or("none"),
    ))
}

pub async fn respond(store: &dyn Store, request: &UssdRequest) -> StoreResult<UssdReply> {
    let mut answers = inputs(&request.text);

    let patient_id = match patient_from_service_code(&request.service_code) {
        Some(id) => normalize_patient_id(id),
        None if answers.is_empty() => {
            return Ok(UssdReply::Continue("Hedera Health ID\nEnter your patient ID:".into()));
        }
        None => normalize_patient_id(&answers.remove(0)),
    };

    if !is_valid_patient_id(&patient_id) {
        return Ok(UssdReply::End(format!("Invalid patient ID {}", patient_id)));
    }
    // Unknown IDs and foreign handsets get the same answer.
    let patient = match store.find_patient(&patient_id).await? {
        Some(p) if p.is_active && same_phone(&p.phone, &request.phone_number) => p,
        _ => return Ok(UssdReply::End(NOT_RECOGNISED.into())),
    };

    let Some(choice) = answers.first() else {
        return Ok(main_menu(&patient));
    };

    let reply = match *choice {
        "1" => {
            let history = store
                .list_consultations(ConsultationFilter {
                    patient_id: Some(patient.id),
                    limit: Some(HISTORY_LIMIT),
                    ..Default::default()
                })
                .await?;
            if history.is_empty() {
                UssdReply::End("No consultations recorded".into())
            } else {
                let lines: Vec<String> = history
                    .iter()
                    .map(|v| {
                        format!(
                            "{} {} - {}",
                            v.consultation.consulted_at.format("%d/%m/%Y"),
                            v.hospital.code,
                            v.consultation.diagnosis.as_deref().unwrap_or(&v.consultation.kind)
                        )
                    })
                    .collect();
                UssdReply::End(lines.join("\n"))
            }
        }
        "2" => {
            let history = store
                .list_consultations(ConsultationFilter {
                    patient_id: Some(patient.id),
                    ..Default::default()
                })
                .await?;
            let active: Vec<String> = history
                .iter()
                .filter(|v| v.consultation.has_active_prescription())
                .take(HISTORY_LIMIT as usize)
                .filter_map(|v| v.consultation.prescription.clone())
                .collect();
            if active.is_empty() {
                UssdReply::End("No active prescriptions".into())
            } else {
                UssdReply::End(active.join("\n"))
            }
        }
        "3" => emergency_card(&patient),
        "0" => UssdReply::End("Thank you for using Hedera Health ID".into()),
        _ => UssdReply::End("Invalid option".into()),
    };
    Ok(reply)
}
