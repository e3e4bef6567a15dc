//! Health check handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::interfaces::http::ApiState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_charge_points: usize,
}

/// `GET /health`
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        connected_charge_points: state.session_registry.count(),
    })
}
