use actix_web::{web, HttpResponse};
use chrono::Utc;
use tracing::info;

use crate::api::{created, list};
use crate::auth::AuthenticatedUser;
use crate::core::identity::normalize_patient_id;
use crate::error::{ApiError, ApiResult};
use crate::models::{Doctor, GrantPermissionRequest, Patient};
use crate::AppState;

async fn own_patient(state: &AppState, user: &AuthenticatedUser, patient_id: &str) -> ApiResult<Patient> {
    let patient_id = normalize_patient_id(patient_id);
    if !user.is_patient(&patient_id) {
        return Err(ApiError::Forbidden("only the patient can manage access to their record".into()));
    }
    state
        .store
        .find_patient(&patient_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", patient_id)))
}

async fn doctor_by_external_id(state: &AppState, doctor_id: &str) -> ApiResult<Doctor> {
    state
        .store
        .find_doctor_by_doctor_id(doctor_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("doctor {} not found", doctor_id)))
}

pub async fn list_permissions(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    patient_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let patient_id = normalize_patient_id(&patient_id);
    if !(user.is_patient(&patient_id) || user.role().is_admin()) {
        return Err(ApiError::forbidden());
    }
    let patient = state
        .store
        .find_patient(&patient_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", patient_id)))?;
    Ok(list(state.store.list_permissions(patient.id).await?))
}

pub async fn grant_permission(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    patient_id: web::Path<String>,
    body: web::Json<GrantPermissionRequest>,
) -> ApiResult<HttpResponse> {
    let patient = own_patient(&state, &user, &patient_id).await?;
    let request = body.into_inner();
    if let Some(expires_at) = request.expires_at {
        if expires_at <= Utc::now() {
            return Err(ApiError::Validation("expiresAt: must be in the future".into()));
        }
    }
    let doctor = doctor_by_external_id(&state, request.doctor_id.trim()).await?;

    let permission = state
        .store
        .grant_permission(doctor.id, patient.id, request.expires_at)
        .await?;
    info!(patient_id = %patient.patient_id, doctor_id = %doctor.doctor_id, "access granted");
    state.mirror.access_granted(&patient.patient_id, &doctor.doctor_id);
    Ok(created(permission, "access granted"))
}

pub async fn revoke_permission(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (patient_id, doctor_id) = path.into_inner();
    let patient = own_patient(&state, &user, &patient_id).await?;
    let doctor = doctor_by_external_id(&state, &doctor_id).await?;

    state.store.revoke_permission(doctor.id, patient.id).await?;
    info!(patient_id = %patient.patient_id, doctor_id = %doctor.doctor_id, "access revoked");
    state.mirror.access_revoked(&patient.patient_id, &doctor.doctor_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "message": "access revoked" })))
}
