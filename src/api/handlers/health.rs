use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::error::ApiResult;
use crate::AppState;

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let timestamp = Utc::now().to_rfc3339();
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "OK",
            "database": "Connected",
            "version": state.config.api_version,
            "environment": state.config.environment,
            "timestamp": timestamp,
        })),
        Err(e) => {
            warn!(error = %e, "health check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "ERROR",
                "database": "Disconnected",
                "version": state.config.api_version,
                "environment": state.config.environment,
                "timestamp": timestamp,
            }))
        }
    }
}

/// Connectivity check used by the frontend.
pub async fn api_test(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let counts = state.store.counts().await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Hedera Health ID API is working",
        "databaseStats": counts,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

pub async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "error": "Route not found",
        "path": req.path(),
        "method": req.method().as_str(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
