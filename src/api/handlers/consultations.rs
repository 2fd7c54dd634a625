use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use validator::Validate;

use crate::api::{list, ok};
use crate::auth::{AuthenticatedUser, Role};
use crate::core::identity::{generate_consultation_id, normalize_patient_id};
use crate::core::vitals::{analyze_vitals, bmi};
use crate::db::StoreError;
use crate::error::{ApiError, ApiResult};
use crate::models::{ConsultationFilter, ConsultationView, CreateConsultationRequest, NewConsultation, UpdateStatusRequest};
use crate::AppState;

const ID_ATTEMPTS: usize = 3;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

impl ListQuery {
    fn limit(&self) -> Option<i64> {
        self.limit.map(|l| l.clamp(1, MAX_LIMIT))
    }
}

async fn can_read(state: &AppState, user: &AuthenticatedUser, view: &ConsultationView) -> ApiResult<bool> {
    Ok(match user.role() {
        Role::Patient => user.is_patient(&view.patient.patient_id),
        Role::SuperAdmin => true,
        Role::Admin => user.hospital() == Some(view.consultation.hospital_id),
        Role::Doctor => {
            user.id() == view.consultation.doctor_id
                || state
                    .store
                    .has_permission(user.id(), view.consultation.patient_id, Utc::now())
                    .await?
        }
    })
}

pub async fn list_consultations(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let mut filter = ConsultationFilter {
        limit: query.limit(),
        ..Default::default()
    };
    match user.role() {
        Role::Doctor => filter.doctor_id = Some(user.id()),
        Role::Admin => filter.hospital_id = Some(user.hospital().ok_or_else(ApiError::forbidden)?),
        Role::SuperAdmin => {}
        Role::Patient => return Err(ApiError::forbidden()),
    }
    Ok(list(state.store.list_consultations(filter).await?))
}

pub async fn get_consultation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    consultation_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let view = state
        .store
        .get_consultation(&consultation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("consultation {} not found", consultation_id)))?;
    if !can_read(&state, &user, &view).await? {
        return Err(ApiError::forbidden());
    }
    Ok(ok(view))
}

pub async fn patient_consultations(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    patient_id: web::Path<String>,
    query: web::Query<ListQuery>,
) -> ApiResult<HttpResponse> {
    let patient = super::patients::readable_patient(&state, &user, &patient_id).await?;
    if user.role() == Role::Doctor && !state.store.has_permission(user.id(), patient.id, Utc::now()).await? {
        return Err(ApiError::Forbidden(
            "the patient has not granted you access to their history".into(),
        ));
    }
    let hospital_id = match user.role() {
        Role::Admin => Some(user.hospital().ok_or_else(ApiError::forbidden)?),
        _ => None,
    };
    let history = state
        .store
        .list_consultations(ConsultationFilter {
            patient_id: Some(patient.id),
            hospital_id,
            limit: query.limit(),
            ..Default::default()
        })
        .await?;
    Ok(list(history))
}

pub async fn create_consultation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CreateConsultationRequest>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Doctor])?;
    let hospital_id = user.hospital().ok_or_else(ApiError::forbidden)?;
    let request = body.into_inner();
    request.validate()?;

    let patient = state
        .store
        .find_patient(&normalize_patient_id(&request.patient_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", request.patient_id)))?;

    let warnings = analyze_vitals(&request.vitals);
    let body_mass_index = bmi(&request.vitals);
    let now = Utc::now();

    let mut last_err = None;
    for _ in 0..ID_ATTEMPTS {
        let consultation = NewConsultation {
            consultation_id: generate_consultation_id(now, &mut rand::thread_rng()),
            patient_id: patient.id,
            doctor_id: user.id(),
            hospital_id,
            consulted_at: request.consulted_at.unwrap_or(now),
            kind: request.kind.clone(),
            reason: request.reason.clone(),
            diagnosis: request.diagnosis.clone(),
            prescription: request.prescription.clone(),
            prescribed_exams: request.prescribed_exams.clone(),
            vitals: request.vitals.clone(),
            status: request.status,
            notes: request.notes.clone(),
        };
        match state.store.create_consultation(consultation).await {
            Ok(view) => {
                info!(
                    consultation_id = %view.consultation.consultation_id,
                    patient_id = %view.patient.patient_id,
                    warnings = warnings.len(),
                    "consultation recorded"
                );
                state.mirror.consultation_recorded(&view);
                return Ok(HttpResponse::Created().json(json!({
                    "success": true,
                    "data": view,
                    "warnings": warnings,
                    "bmi": body_mass_index,
                    "message": "consultation recorded",
                })));
            }
            Err(StoreError::Conflict(message)) => last_err = Some(ApiError::Conflict(message)),
            Err(other) => return Err(other.into()),
        }
    }
    Err(last_err.unwrap_or_else(|| ApiError::Conflict("consultation already exists".into())))
}

pub async fn update_status(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    consultation_id: web::Path<String>,
    body: web::Json<UpdateStatusRequest>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::Doctor])?;
    let existing = state
        .store
        .get_consultation(&consultation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("consultation {} not found", consultation_id)))?;
    if existing.consultation.doctor_id != user.id() {
        return Err(ApiError::Forbidden("only the authoring doctor may change the status".into()));
    }
    let view = state
        .store
        .update_consultation_status(&consultation_id, body.status)
        .await?;
    info!(consultation_id = %view.consultation.consultation_id, status = %view.consultation.status, "consultation status changed");
    Ok(ok(view))
}
