//! Centralized error handling for the ingest supervisor
//!
//! # Error Categories
//!
//! - **Supervisor Errors**: process spawn/runtime failures and session conflicts
//! - **VOD Errors**: recorded file lookup and path validation
//! - **Web Errors**: HTTP request handling issues

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Supervisor Results
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Convenience type alias for VOD storage Results
pub type VodResult<T> = Result<T, VodError>;
