use actix_web::{web, HttpResponse};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::api::{created, list, ok};
use crate::auth::{hash_password, AuthenticatedUser, Role};
use crate::core::identity::{doctor_id, next_doctor_sequence};
use crate::db::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::models::{CreateDoctorRequest, NewDoctor};
use crate::AppState;

const ID_ATTEMPTS: usize = 3;

/// Super administrators see every hospital; other admins only their own.
fn hospital_scope(user: &AuthenticatedUser) -> Option<Uuid> {
    if user.role() == Role::SuperAdmin {
        None
    } else {
        user.hospital()
    }
}

pub async fn list_doctors(state: web::Data<AppState>, user: AuthenticatedUser) -> ApiResult<HttpResponse> {
    user.require_admin()?;
    Ok(list(state.store.list_doctors(hospital_scope(&user)).await?))
}

pub async fn get_doctor(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    id: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    let id = id.into_inner();
    let allowed = match user.role() {
        Role::Doctor => user.id() == id,
        Role::Admin | Role::SuperAdmin => true,
        Role::Patient => false,
    };
    if !allowed {
        return Err(ApiError::forbidden());
    }
    let view = state
        .store
        .get_doctor(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("doctor not found".into()))?;
    if user.role() == Role::Admin && user.hospital() != Some(view.doctor.hospital_id) {
        return Err(ApiError::forbidden());
    }
    Ok(ok(view))
}

pub async fn create_doctor(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CreateDoctorRequest>,
) -> ApiResult<HttpResponse> {
    user.require_admin()?;
    let request = body.into_inner();
    request.validate()?;

    let hospital_id = user.hospital().ok_or_else(ApiError::forbidden)?;
    let hospital = state
        .store
        .get_hospital(hospital_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("hospital not found".into()))?;

    let chosen = request
        .doctor_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let mut sequence = match chosen {
        Some(_) => 0,
        None => {
            let existing = state.store.list_doctors(Some(hospital.id)).await?;
            next_doctor_sequence(&hospital.code, existing.iter().map(|d| d.doctor.doctor_id.as_str()))
        }
    };

    let mut doctor = NewDoctor {
        doctor_id: chosen.clone().unwrap_or_else(|| doctor_id(&hospital.code, sequence)),
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        email: request.email.trim().to_lowercase(),
        phone: request.phone,
        specialty: request.specialty,
        department: request.department,
        hospital_id: hospital.id,
        password_hash: hash_password(&request.password)?,
    };
    let mut attempts = 1;
    let view = loop {
        match state.store.create_doctor(doctor.clone()).await {
            Ok(view) => break view,
            // A concurrent create may have taken the generated ID.
            Err(StoreError::Conflict(_)) if chosen.is_none() && attempts < ID_ATTEMPTS => {
                attempts += 1;
                sequence += 1;
                doctor.doctor_id = doctor_id(&hospital.code, sequence);
            }
            Err(other) => return Err(other.into()),
        }
    };
    info!(doctor_id = %view.doctor.doctor_id, hospital = %hospital.code, "doctor created");
    Ok(created(view, "doctor created"))
}
