use actix_web::{web, HttpResponse};
use chrono::{Datelike, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::api::{list, ok};
use crate::auth::{hash_password, AuthenticatedUser, Role};
use crate::core::identity::{generate_patient_id, is_valid_patient_id, normalize_patient_id, PatientCard};
use crate::db::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::models::{NewPatient, Patient, PatientUpdate, RegisterPatientRequest};
use crate::AppState;

/// Generated IDs draw from 9999 values per year, so collisions get a few retries.
const ID_ATTEMPTS: usize = 5;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PatientDetail {
    #[serde(flatten)]
    patient: Patient,
    age: u32,
}

/// Loads a patient the caller may read: the patient themself, any doctor or any admin.
pub(crate) async fn readable_patient(
    state: &AppState,
    user: &AuthenticatedUser,
    patient_id: &str,
) -> ApiResult<Patient> {
    let patient_id = normalize_patient_id(patient_id);
    if user.role() == Role::Patient && !user.is_patient(&patient_id) {
        return Err(ApiError::forbidden());
    }
    state
        .store
        .find_patient(&patient_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", patient_id)))
}

pub async fn list_patients(state: web::Data<AppState>, user: AuthenticatedUser) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Doctor, Role::Admin, Role::SuperAdmin])?;
    Ok(list(state.store.list_patients().await?))
}

pub async fn register_patient(
    state: web::Data<AppState>,
    body: web::Json<RegisterPatientRequest>,
) -> ApiResult<HttpResponse> {
    let mut request = body.into_inner();
    request.validate()?;
    let today = Utc::now().date_naive();
    if request.date_of_birth > today {
        return Err(ApiError::Validation("dateOfBirth: cannot be in the future".into()));
    }

    let requested_id = request.patient_id.take().map(|id| normalize_patient_id(&id));
    if let Some(id) = &requested_id {
        if !is_valid_patient_id(id) {
            return Err(ApiError::Validation(format!("patientId: {} does not match BJYYYYNNNN", id)));
        }
    }

    let password_hash = hash_password(&request.password)?;
    let year = today.year();
    let attempts = if requested_id.is_some() { 1 } else { ID_ATTEMPTS };

    let mut last_err = None;
    for _ in 0..attempts {
        let patient_id = requested_id
            .clone()
            .unwrap_or_else(|| generate_patient_id(year, &mut rand::thread_rng()));
        let new_patient = NewPatient::from_request(request.clone(), patient_id, password_hash.clone());
        match state.store.create_patient(new_patient).await {
            Ok(patient) => {
                info!(patient_id = %patient.patient_id, "patient registered");
                state.mirror.patient_registered(&patient);
                let card = PatientCard::for_patient(&patient, Utc::now());
                return Ok(HttpResponse::Created().json(json!({
                    "success": true,
                    "data": patient,
                    "card": card,
                    "message": "patient registered",
                })));
            }
            Err(StoreError::Conflict(message)) => last_err = Some(ApiError::Conflict(message)),
            Err(other) => return Err(other.into()),
        }
    }
    Err(last_err.unwrap_or_else(|| ApiError::Conflict("patient already exists".into())))
}

pub async fn get_patient(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    patient_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let patient = readable_patient(&state, &user, &patient_id).await?;
    let age = patient.age_on(Utc::now().date_naive());
    Ok(ok(PatientDetail { patient, age }))
}

pub async fn update_patient(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    patient_id: web::Path<String>,
    body: web::Json<PatientUpdate>,
) -> ApiResult<HttpResponse> {
    let patient_id = normalize_patient_id(&patient_id);
    if !(user.is_patient(&patient_id) || user.role().is_admin()) {
        return Err(ApiError::forbidden());
    }
    let update = body.into_inner();
    update.validate()?;
    if update.is_empty() {
        return Err(ApiError::BadRequest("no updatable fields provided".into()));
    }

    let patient = state.store.update_patient(&patient_id, update).await?;
    info!(patient_id = %patient.patient_id, updated_by = %user.role(), "patient updated");
    state.mirror.patient_updated(&patient);
    Ok(ok(patient))
}

pub async fn patient_card(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    patient_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let patient = readable_patient(&state, &user, &patient_id).await?;
    Ok(ok(PatientCard::for_patient(&patient, Utc::now())))
}
