use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use chatmate_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

/// Health check that probes the record store.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let storage = match state.profiles.ping() {
        Ok(()) => HealthCheck::healthy("storage"),
        Err(e) => HealthCheck::unhealthy("storage", e.to_string()),
    };

    let response = HealthResponse::healthy("chatmate-bot", env!("CARGO_PKG_VERSION")).with_checks(vec![storage]);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}
