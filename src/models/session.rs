use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle of one ingest session: Starting → Active → Stopping → Terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Starting,
    Active,
    Stopping,
    Terminated,
}

impl SessionState {
    /// Starting or Active: the session still owns its ingest
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Starting => write!(f, "starting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Read-only view of a registered session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub stream_id: String,
    pub session_id: Uuid,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub recording_pid: Option<u32>,
    pub metrics_pid: Option<u32>,
    pub output_path: Option<PathBuf>,
}
