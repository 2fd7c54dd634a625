use actix_cors::Cors;
use actix_web::http::{header, Method};

use crate::config::Settings;

fn is_localhost(origin: &str) -> bool {
    url::Url::parse(origin)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "localhost" || h == "127.0.0.1"))
        .unwrap_or(false)
}

/// CORS policy: the configured allow-list, plus any localhost origin outside production.
pub fn cors(settings: &Settings) -> Cors {
    let allowed = settings.cors.allowed_origins.clone();
    let allow_localhost = settings.cors.allow_localhost && !settings.is_production();

    Cors::default()
        .allowed_origin_fn(move |origin, _req| {
            let Ok(origin) = origin.to_str() else {
                return false;
            };
            if allowed.iter().any(|o| o == origin) || (allow_localhost && is_localhost(origin)) {
                true
            } else {
                tracing::warn!(%origin, "CORS origin rejected");
                false
            }
        })
        .allowed_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allowed_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .supports_credentials()
        .max_age(3600)
}
