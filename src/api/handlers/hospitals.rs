use actix_web::{web, HttpResponse};
use validator::Validate;

use crate::api::{created, list, ok};
use crate::auth::{AuthenticatedUser, Role};
use crate::error::{ApiError, ApiResult};
use crate::models::NewHospital;
use crate::AppState;

pub async fn list_hospitals(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    Ok(list(state.store.list_hospitals().await?))
}

pub async fn get_hospital(state: web::Data<AppState>, code: web::Path<String>) -> ApiResult<HttpResponse> {
    let code = code.into_inner();
    let hospital = state
        .store
        .find_hospital_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("hospital {} not found", code)))?;
    Ok(ok(hospital))
}

pub async fn create_hospital(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<NewHospital>,
) -> ApiResult<HttpResponse> {
    user.require_role(&[Role::SuperAdmin])?;
    let request = body.into_inner().normalized();
    request.validate()?;
    let hospital = state.store.create_hospital(request).await?;
    tracing::info!(code = %hospital.code, "hospital created");
    Ok(created(hospital, "hospital created"))
}
