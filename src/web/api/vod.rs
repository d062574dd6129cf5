//! Recorded stream listing and download

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::errors::{AppError, VodError};
use crate::web::{
    AppState,
    responses::{handle_error, handle_result},
};

pub async fn list_recordings(State(state): State<AppState>) -> Response {
    handle_result(state.vod_storage.list_recordings().await.map_err(AppError::from))
}

pub async fn download_recording(Path(filename): Path<String>, State(state): State<AppState>) -> Response {
    let path = match state.vod_storage.resolve_recording(&filename).await {
        Ok(path) => path,
        Err(e) => return handle_error(e.into()),
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return handle_error(VodError::NotFound { filename }.into());
        }
        Err(e) => return handle_error(VodError::Io(e).into()),
    };
    debug!("Serving recording {}", path.display());

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("video/mp4")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}
