//! Error types for roadmark-gt
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. No condition here terminates the process; failures degrade
//! to "stay pending" or "retry next tick" at the call site.

use thiserror::Error;

/// Main error type for the roadmark-gt service
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Non-finite or out-of-range latitude/longitude
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using roadmark-gt Error
pub type Result<T> = std::result::Result<T, Error>;
