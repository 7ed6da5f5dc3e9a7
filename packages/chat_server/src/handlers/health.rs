use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;

/// Health check endpoint - fixed OK while the process is serving
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Metrics endpoint - returns relay counters
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
