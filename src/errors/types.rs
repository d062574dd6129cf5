//! Error type definitions for the ingest supervisor
//!
//! None of the supervisor errors are fatal to the supervisor itself: they are
//! logged with stream context and surface to callers only as return values.

use thiserror::Error;

use crate::models::ProcessRole;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Supervisor errors
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    /// VOD storage errors
    #[error("VOD error: {0}")]
    Vod(#[from] VodError),

    /// Web layer errors
    #[error("Web error: {0}")]
    Web(#[from] WebError),

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process and session lifecycle errors
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The external process could not be launched
    #[error("Failed to spawn {role} process '{command}': {message}")]
    Spawn {
        role: ProcessRole,
        command: String,
        message: String,
    },

    /// The external process reported an error after it was spawned
    #[error("{role} process for stream {stream_id} failed: {message}")]
    ProcessRuntime {
        role: ProcessRole,
        stream_id: String,
        message: String,
    },

    /// The external process terminated with a non-normal status
    #[error("{role} process for stream {stream_id} exited with {status}")]
    NonZeroExit {
        role: ProcessRole,
        stream_id: String,
        status: String,
    },

    /// An ingest started for a stream that already has a live session
    #[error("Stream {stream_id} already has a session in state {state}")]
    DuplicateSession { stream_id: String, state: String },

    /// Lookup of a stream that has no registered session
    #[error("No session for stream {stream_id}")]
    SessionNotFound { stream_id: String },

    /// Stream path reported by the media server could not be interpreted
    #[error("Invalid stream path: {path}")]
    InvalidStreamPath { path: String },
}

/// Recorded file storage errors
#[derive(Error, Debug)]
pub enum VodError {
    /// Filename is empty, contains separators or points outside the VOD root
    #[error("Invalid filename: {filename}")]
    InvalidFilename { filename: String },

    #[error("Recording not found: {filename}")]
    NotFound { filename: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Web layer specific errors
#[derive(Error, Debug)]
pub enum WebError {
    /// Invalid request format
    #[error("Invalid request: {field} - {message}")]
    InvalidRequest { field: String, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

impl SupervisorError {
    pub fn spawn<C: Into<String>, M: Into<String>>(role: ProcessRole, command: C, message: M) -> Self {
        Self::Spawn {
            role,
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn runtime<S: Into<String>, M: Into<String>>(role: ProcessRole, stream_id: S, message: M) -> Self {
        Self::ProcessRuntime {
            role,
            stream_id: stream_id.into(),
            message: message.into(),
        }
    }
}

impl WebError {
    /// Create an invalid request error
    pub fn invalid_request<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            message: message.into(),
        }
    }
}
