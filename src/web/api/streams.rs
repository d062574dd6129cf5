//! Per-stream metrics and status

use axum::{
    extract::{Path, State},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{MetricsState, SessionState};
use crate::web::{AppState, responses::ok};

#[derive(Debug, Serialize)]
pub struct StreamStatus {
    pub stream_id: String,
    pub is_live: bool,
    pub bitrate_kbps: u64,
    pub bandwidth_kbps: f64,
    pub latency_ms: u64,
    pub last_updated: DateTime<Utc>,
    /// Absent when no session is registered for the stream
    pub session_state: Option<SessionState>,
}

#[derive(Debug, Serialize)]
pub struct MetricsOverview {
    /// Most recently updated stream, zeroed when nothing is live
    pub current: MetricsState,
    pub streams: BTreeMap<String, MetricsState>,
}

/// Latest metrics for a stream; zeros when it has none
pub async fn stream_metrics(Path(stream_id): Path<String>, State(state): State<AppState>) -> Response {
    let metrics = state
        .metrics_store
        .get_metrics(&stream_id)
        .await
        .unwrap_or_else(|| MetricsState::zeroed(Utc::now()));
    ok(metrics)
}

pub async fn stream_status(Path(stream_id): Path<String>, State(state): State<AppState>) -> Response {
    let metrics = state
        .metrics_store
        .get_metrics(&stream_id)
        .await
        .unwrap_or_else(|| MetricsState::zeroed(Utc::now()));
    let session_state = state.supervisor.session_state(&stream_id).await;

    ok(StreamStatus {
        stream_id,
        is_live: metrics.is_live(),
        bitrate_kbps: metrics.bitrate_kbps,
        bandwidth_kbps: metrics.bandwidth_kbps,
        latency_ms: metrics.latency_ms,
        last_updated: metrics.last_updated,
        session_state,
    })
}

pub async fn all_metrics(State(state): State<AppState>) -> Response {
    let current = state.metrics_store.current_metrics().await;
    let streams = state.metrics_store.snapshot().await.into_iter().collect();
    ok(MetricsOverview { current, streams })
}
