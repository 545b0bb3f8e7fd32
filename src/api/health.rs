use axum::{extract::State, Json};
use serde::Serialize;

use crate::controller::{AppState, Status};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    limiter_status: Status,
}

/// GET /healthz
///
/// Liveness of the service; the limiter status is informational only.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now(),
        limiter_status: state.handle.status(),
    })
}
