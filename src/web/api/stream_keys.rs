//! Stream key management

use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use serde::Serialize;

use crate::models::{StreamKey, StreamSettingsUpdate};
use crate::web::{
    AppState,
    responses::{handle_error, ok},
};

/// A key plus whether a session is currently live on it
#[derive(Debug, Serialize)]
pub struct StreamKeyView {
    #[serde(flatten)]
    pub key: StreamKey,
    pub is_streaming: bool,
}

async fn view(state: &AppState, key: StreamKey) -> StreamKeyView {
    let is_streaming = state
        .supervisor
        .session_state(&key.stream_key)
        .await
        .is_some_and(|s| s.is_live());
    StreamKeyView { key, is_streaming }
}

pub async fn list_keys(State(state): State<AppState>) -> Response {
    let mut views = Vec::new();
    for key in state.stream_keys.list().await {
        views.push(view(&state, key).await);
    }
    ok(views)
}

pub async fn create_key(State(state): State<AppState>) -> Response {
    let key = state.stream_keys.create().await;
    ok(view(&state, key).await)
}

pub async fn get_key(Path(key): Path<String>, State(state): State<AppState>) -> Response {
    match state.stream_keys.get(&key).await {
        Ok(key) => ok(view(&state, key).await),
        Err(e) => handle_error(e),
    }
}

/// Revoking a key does not interrupt a session already publishing on it
pub async fn delete_key(Path(key): Path<String>, State(state): State<AppState>) -> Response {
    match state.stream_keys.delete(&key).await {
        Ok(removed) => ok(removed),
        Err(e) => handle_error(e),
    }
}

pub async fn regenerate_key(Path(key): Path<String>, State(state): State<AppState>) -> Response {
    match state.stream_keys.regenerate(&key).await {
        Ok(key) => ok(view(&state, key).await),
        Err(e) => handle_error(e),
    }
}

pub async fn update_settings(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(update): Json<StreamSettingsUpdate>,
) -> Response {
    match state.stream_keys.update_settings(&key, update).await {
        Ok(key) => ok(view(&state, key).await),
        Err(e) => handle_error(e),
    }
}
