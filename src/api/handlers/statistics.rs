use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::{created, list, ok};
use crate::auth::{AuthenticatedUser, Role};
use crate::core::statistics::{self, DEFAULT_ACTIVITY_LIMIT};
use crate::error::{ApiError, ApiResult};
use crate::models::SnapshotPeriod;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotRequest {
    pub period: Option<String>,
}

/// Hospital admins only see their own hospital in the feed.
fn activity_scope(user: &AuthenticatedUser) -> ApiResult<Option<Uuid>> {
    match user.role() {
        Role::Admin => Ok(Some(user.hospital().ok_or_else(ApiError::forbidden)?)),
        _ => Ok(None),
    }
}

pub async fn dashboard(state: web::Data<AppState>, user: AuthenticatedUser) -> ApiResult<HttpResponse> {
    user.require_admin()?;
    let scope = activity_scope(&user)?;
    let store = state.store.as_ref();
    let (summary, activity) = tokio::try_join!(
        statistics::dashboard(store, Utc::now()),
        statistics::recent_activity(store, scope, DEFAULT_ACTIVITY_LIMIT),
    )?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "statistics": summary,
            "recentActivity": activity,
        },
    })))
}

pub async fn monthly(state: web::Data<AppState>, user: AuthenticatedUser) -> ApiResult<HttpResponse> {
    user.require_admin()?;
    Ok(ok(statistics::monthly(state.store.as_ref(), Utc::now()).await?))
}

pub async fn activity(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<ActivityQuery>,
) -> ApiResult<HttpResponse> {
    user.require_admin()?;
    let scope = activity_scope(&user)?;
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, 100);
    Ok(list(statistics::recent_activity(state.store.as_ref(), scope, limit).await?))
}

pub async fn create_snapshot(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: Option<web::Json<SnapshotRequest>>,
) -> ApiResult<HttpResponse> {
    user.require_admin()?;
    let period = match body.and_then(|b| b.into_inner().period) {
        Some(raw) => raw.parse::<SnapshotPeriod>().map_err(ApiError::BadRequest)?,
        None => SnapshotPeriod::default(),
    };
    let snapshot = statistics::save_snapshot(state.store.as_ref(), period, Utc::now()).await?;
    Ok(created(snapshot, "statistics snapshot saved"))
}
