//! Health check endpoint.

use actix_web::{HttpResponse, web};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub threshold: u64,
    pub window_secs: u64,
    pub timestamp: String,
}

/// Health check endpoint - returns server status and the active quota.
///
/// GET /health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let policy = state.engine.policy();

    let response = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        threshold: policy.threshold,
        window_secs: policy.window.as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    HttpResponse::Ok().json(response)
}
