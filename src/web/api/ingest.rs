//! Publish hooks from the media server

use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult, SupervisorError, WebError};
use crate::models::StreamPath;
use crate::web::{
    AppState,
    responses::{handle_error, ok},
};

/// Identifies the stream either by its full publish path or by its key
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    /// `/<app>/<stream_id>` as reported by the media server
    pub stream_path: Option<String>,
    /// Bare stream key, published under the `live` application
    pub stream_id: Option<String>,
}

impl IngestRequest {
    pub fn resolve(&self) -> AppResult<StreamPath> {
        match (&self.stream_path, &self.stream_id) {
            (Some(path), _) => Ok(StreamPath::parse(path)?),
            (None, Some(stream_id)) => Ok(StreamPath::live(stream_id)?),
            (None, None) => Err(AppError::Web(WebError::invalid_request(
                "stream_path",
                "either stream_path or stream_id is required",
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngestEndResponse {
    pub stream_id: String,
    /// False when there was no live session to stop
    pub stopping: bool,
}

pub async fn ingest_start(State(state): State<AppState>, Json(request): Json<IngestRequest>) -> Response {
    let path = match request.resolve() {
        Ok(path) => path,
        Err(e) => return handle_error(e),
    };
    debug!("Ingest start for {}", path);

    match state.supervisor.on_ingest_start(&path).await {
        Ok(snapshot) => ok(snapshot),
        Err(e) => handle_error(e.into()),
    }
}

pub async fn ingest_end(State(state): State<AppState>, Json(request): Json<IngestRequest>) -> Response {
    let path = match request.resolve() {
        Ok(path) => path,
        Err(e) => return handle_error(e),
    };
    debug!("Ingest end for {}", path);

    let stopping = state.supervisor.on_ingest_end(&path.stream_id).await;
    ok(IngestEndResponse {
        stream_id: path.stream_id,
        stopping,
    })
}

pub async fn list_sessions(State(state): State<AppState>) -> Response {
    ok(state.supervisor.sessions().await)
}

pub async fn get_session(Path(stream_id): Path<String>, State(state): State<AppState>) -> Response {
    match state.supervisor.snapshot(&stream_id).await {
        Some(snapshot) => ok(snapshot),
        None => handle_error(SupervisorError::SessionNotFound { stream_id }.into()),
    }
}
