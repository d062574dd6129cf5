//! HTTP response types and utilities
//!
//! Every JSON endpoint wraps its payload in [`ApiResponse`] and maps
//! [`AppError`] to a status code through [`handle_error`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{AppError, AppResult, SupervisorError, VodError};

/// JSON envelope shared by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured context for failures, e.g. the conflicting session state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: String, details: Option<HashMap<String, String>>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            details,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Convert AppResult to HTTP response
pub fn handle_result<T>(result: AppResult<T>) -> Response
where
    T: Serialize,
{
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(error) => handle_error(error),
    }
}

/// Convert AppError to appropriate HTTP response
pub fn handle_error(error: AppError) -> Response {
    let (status, message, details) = match &error {
        AppError::Supervisor(SupervisorError::DuplicateSession { stream_id, state }) => (
            StatusCode::CONFLICT,
            error.to_string(),
            Some(HashMap::from([
                ("stream_id".to_string(), stream_id.clone()),
                ("state".to_string(), state.clone()),
            ])),
        ),
        AppError::Supervisor(SupervisorError::InvalidStreamPath { .. }) => {
            (StatusCode::BAD_REQUEST, error.to_string(), None)
        }
        AppError::Supervisor(SupervisorError::SessionNotFound { .. }) => {
            (StatusCode::NOT_FOUND, error.to_string(), None)
        }
        AppError::Supervisor(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Supervisor operation failed".to_string(),
            None,
        ),
        AppError::Vod(VodError::InvalidFilename { .. }) => {
            (StatusCode::BAD_REQUEST, error.to_string(), None)
        }
        AppError::Vod(VodError::NotFound { filename }) => (
            StatusCode::NOT_FOUND,
            format!("Recording '{}' not found", filename),
            None,
        ),
        AppError::Vod(VodError::Io(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Recording storage access failed".to_string(),
            None,
        ),
        AppError::NotFound { .. } => (StatusCode::NOT_FOUND, error.to_string(), None),
        AppError::Web(web_error) => (StatusCode::BAD_REQUEST, web_error.to_string(), None),
        AppError::Configuration { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Configuration error: {}", message),
            None,
        ),
        AppError::Io(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "I/O operation failed".to_string(),
            None,
        ),
    };

    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    }

    (status, Json(ApiResponse::<()>::failure(message, details))).into_response()
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}
