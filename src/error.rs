//! HTTP error type shared by every handler.

use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use validator::ValidationErrors;

use crate::db::StoreError;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }

    pub fn forbidden() -> Self {
        ApiError::Forbidden("you are not allowed to access this resource".into())
    }

    /// Message safe to show a client.
    fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "an internal error occurred".to_string(),
            ApiError::Unavailable(_) => "service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Internal(source) => error!(error = ?source, "request failed"),
            ApiError::Unavailable(detail) => warn!(%detail, "dependency unavailable"),
            _ => {}
        }
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.code(),
            "message": self.public_message(),
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            StoreError::Conflict(message) => ApiError::Conflict(message),
            StoreError::Unavailable(detail) => ApiError::Unavailable(detail),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyRegistered(address) => {
                ApiError::Conflict(format!("patient address {} is already registered", address))
            }
            LedgerError::UnknownPatient(address) => {
                ApiError::NotFound(format!("no ledger entry for patient address {}", address))
            }
            other => ApiError::internal(other),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{}: {}", field, detail)
            })
            .collect();
        fields.sort();
        ApiError::Validation(fields.join("; "))
    }
}

/// Turns malformed or oversized JSON bodies into the standard error payload.
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    warn!(method = %req.method(), path = %req.path(), error = %err, "rejected JSON payload");
    let api_error = match &err {
        JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
            ApiError::BadRequest("request body is too large".into())
        }
        JsonPayloadError::ContentType => ApiError::BadRequest("expected an application/json body".into()),
        JsonPayloadError::Deserialize(e) => ApiError::BadRequest(format!("invalid JSON body: {}", e)),
        _ => ApiError::BadRequest("invalid request payload".into()),
    };
    let response = api_error.error_response();
    actix_web::error::InternalError::from_response(err, response).into()
}

/// A path segment of the wrong shape (say a non-UUID id) names no resource.
pub fn path_error_handler(err: PathError, req: &HttpRequest) -> actix_web::Error {
    warn!(method = %req.method(), path = %req.path(), error = %err, "rejected path parameter");
    let response = ApiError::NotFound(format!("no resource at {}", req.path())).error_response();
    actix_web::error::InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, req: &HttpRequest) -> actix_web::Error {
    warn!(method = %req.method(), path = %req.path(), error = %err, "rejected query string");
    let response = ApiError::BadRequest(format!("invalid query string: {}", err)).error_response();
    actix_web::error::InternalError::from_response(err, response).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use test_case::test_case;

    #[test_case(StoreError::NotFound("patient BJ20250001".into()), StatusCode::NOT_FOUND)]
    #[test_case(StoreError::Conflict("duplicate".into()), StatusCode::CONFLICT)]
    #[test_case(StoreError::Unavailable("pool closed".into()), StatusCode::SERVICE_UNAVAILABLE)]
    #[test_case(StoreError::Corrupt("bad status".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn store_errors_map_to_status(err: StoreError, status: StatusCode) {
        assert_eq!(ApiError::from(err).status_code(), status);
    }

    #[actix_rt::test]
    async fn internal_errors_do_not_leak_details() {
        let err = ApiError::internal(anyhow::anyhow!("password authentication failed for user postgres"));
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "INTERNAL_ERROR");
        assert!(!json["message"].as_str().unwrap().contains("postgres"));
    }
}
