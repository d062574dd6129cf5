//! Health check HTTP handler

use axum::{extract::State, response::Response};
use serde::Serialize;

use crate::web::{AppState, responses::ok};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let active_sessions = state.supervisor.sessions().await.len();

    ok(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions,
        timestamp: chrono::Utc::now(),
    })
}
