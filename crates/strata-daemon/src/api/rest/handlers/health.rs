//! Liveness and readiness handlers

use crate::api::rest::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Liveness: the process is serving requests
pub async fn healthz(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}

/// Readiness: the storage backend answers
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<HealthCheckResponse>) {
    let (code, status) = match state.db.ping().await {
        Ok(()) => (StatusCode::OK, "ready".to_string()),
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("unavailable: {}", err))
        }
    };

    (
        code,
        Json(HealthCheckResponse {
            status,
            version: state.version.clone(),
            uptime: state.uptime(),
        }),
    )
}
