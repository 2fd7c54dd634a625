//! Login endpoints for patients, hospital administrators and doctors.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{verify_password, Role};
use crate::core::identity::normalize_patient_id;
use crate::error::{ApiError, ApiResult};
use crate::models::{AdminRole, HospitalRef};
use crate::AppState;

const BAD_CREDENTIALS: &str = "invalid credentials";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientLogin {
    #[serde(default)]
    pub patient_id: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLogin {
    #[serde(default)]
    pub admin_id: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorLogin {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub hospital_code: String,
}

fn require(fields: &[(&str, &str)]) -> ApiResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("missing required fields: {}", missing.join(", "))))
    }
}

fn unauthorized() -> ApiError {
    ApiError::Unauthorized(BAD_CREDENTIALS.into())
}

pub async fn patient_login(state: web::Data<AppState>, body: web::Json<PatientLogin>) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    require(&[("patientId", body.patient_id.as_str()), ("password", body.password.as_str())])?;

    let patient = state
        .store
        .find_patient(&normalize_patient_id(&body.patient_id))
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(unauthorized)?;
    if !verify_password(&body.password, &patient.password_hash) {
        return Err(unauthorized());
    }

    state.store.touch_patient_login(patient.id, Utc::now()).await?;
    let issued = state.tokens.issue(patient.id, Role::Patient, &patient.patient_id, None)?;
    info!(patient_id = %patient.patient_id, "patient logged in");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "token": issued.token,
            "expiresAt": issued.expires_at,
            "patient": patient,
        },
    })))
}

pub async fn hospital_login(state: web::Data<AppState>, body: web::Json<AdminLogin>) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    require(&[("adminId", body.admin_id.as_str()), ("password", body.password.as_str())])?;

    let admin = state
        .store
        .find_admin(body.admin_id.trim())
        .await?
        .filter(|a| a.is_active)
        .ok_or_else(unauthorized)?;
    if !verify_password(&body.password, &admin.password_hash) {
        return Err(unauthorized());
    }
    let hospital = state
        .store
        .get_hospital(admin.hospital_id)
        .await?
        .ok_or_else(|| ApiError::internal(anyhow::anyhow!("admin {} has no hospital", admin.admin_id)))?;

    state.store.touch_admin_login(admin.id, Utc::now()).await?;
    let role = match admin.role {
        AdminRole::SuperAdmin => Role::SuperAdmin,
        AdminRole::Admin => Role::Admin,
    };
    let issued = state.tokens.issue(admin.id, role, &admin.admin_id, Some(hospital.id))?;
    info!(admin_id = %admin.admin_id, hospital = %hospital.code, "administrator logged in");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "token": issued.token,
            "expiresAt": issued.expires_at,
            "admin": admin,
            "hospital": HospitalRef::from(&hospital),
        },
    })))
}

pub async fn doctor_login(state: web::Data<AppState>, body: web::Json<DoctorLogin>) -> ApiResult<HttpResponse> {
    let body = body.into_inner();
    require(&[
        ("email", body.email.as_str()),
        ("password", body.password.as_str()),
        ("hospitalCode", body.hospital_code.as_str()),
    ])?;

    let email = body.email.trim().to_lowercase();
    let view = state
        .store
        .find_doctor_for_login(&email, body.hospital_code.trim())
        .await?
        .ok_or_else(unauthorized)?;
    if !verify_password(&body.password, &view.doctor.password_hash) {
        return Err(unauthorized());
    }

    state.store.touch_doctor_login(view.doctor.id, Utc::now()).await?;
    let issued = state.tokens.issue(
        view.doctor.id,
        Role::Doctor,
        &view.doctor.doctor_id,
        Some(view.doctor.hospital_id),
    )?;
    info!(doctor_id = %view.doctor.doctor_id, hospital = %view.hospital.code, "doctor logged in");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "token": issued.token,
            "expiresAt": issued.expires_at,
            "doctor": view,
        },
    })))
}
