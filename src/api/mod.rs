//! API module for Hedera Health ID
//!
//! Routes, handlers and middleware of the REST API.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::json;

use crate::error::{json_error_handler, path_error_handler, query_error_handler};
use crate::AppState;

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::configure;

/// `{ success: true, data }`
pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

/// `{ success: true, data: [...], count }`
pub fn list<T: Serialize>(items: Vec<T>) -> HttpResponse {
    let count = items.len();
    HttpResponse::Ok().json(json!({ "success": true, "data": items, "count": count }))
}

/// `201 { success: true, data, message }`
pub fn created<T: Serialize>(data: T, message: &str) -> HttpResponse {
    HttpResponse::Created().json(json!({ "success": true, "data": data, "message": message }))
}

/// Shared state, JSON limits, every route and the JSON 404 fallback.
pub fn app_config(state: web::Data<AppState>) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |cfg: &mut web::ServiceConfig| {
        let json = web::JsonConfig::default()
            .limit(state.config.server.json_limit_bytes)
            .error_handler(json_error_handler);
        let path = web::PathConfig::default().error_handler(path_error_handler);
        let query = web::QueryConfig::default().error_handler(query_error_handler);
        cfg.app_data(state.clone()).app_data(json).app_data(path).app_data(query);
        configure(cfg);
        cfg.default_service(web::to(handlers::health::not_found));
    }
}
