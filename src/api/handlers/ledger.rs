//! `/api/hedera` routes over the blockchain facade.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;

use crate::api::{created, ok};
use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::ledger::PatientRegistration;
use crate::AppState;

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Hedera service operational",
        "status": state.ledger.status(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn contracts(state: web::Data<AppState>) -> HttpResponse {
    ok(state.ledger.contracts())
}

pub async fn create_patient(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    body: web::Json<PatientRegistration>,
) -> ApiResult<HttpResponse> {
    let registration = body.into_inner();
    if registration.patient_address.trim().is_empty() {
        return Err(ApiError::BadRequest("patientAddress is required".into()));
    }
    if registration.personal_data.is_null() {
        return Err(ApiError::BadRequest("personalData is required".into()));
    }
    let receipt = state.ledger.register_patient(registration).await?;
    Ok(created(receipt, "patient registered on the ledger"))
}

pub async fn patient_entry(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    sequence: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let sequence = sequence.into_inner();
    let entry = state
        .ledger
        .patient_entry(sequence)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ledger patient {} not found", sequence)))?;
    Ok(ok(entry))
}
