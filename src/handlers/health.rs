use axum::{extract::State, http::StatusCode, Json};
use crate::models::HealthResponse;
use crate::state::AppState;
use tracing::{debug, warn};

fn health(state: &AppState, status: &str, message: &str) -> Json<HealthResponse> {
    Json(HealthResponse {
        service: state.config.service_name.clone(),
        status: status.to_string(),
        message: message.to_string(),
    })
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");
    health(&state, "ok", "Server is running")
}

/// Readiness check endpoint. Without a JWT secret no client can be admitted.
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    debug!("Readiness check requested");
    if state.config.jwt_secret.is_none() {
        warn!("Readiness check failed: JWT secret not configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            health(&state, "unavailable", "JWT secret not configured"),
        );
    }
    (StatusCode::OK, health(&state, "ok", "Service is ready"))
}
