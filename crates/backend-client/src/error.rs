//! Error types for backend-client.

use thiserror::Error;

/// Errors that can occur when talking to the push backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Backend accepted the request but reported errors in the body.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// A required field was missing from a response.
    #[error("Missing field in response: {0}")]
    MissingField(&'static str),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BackendError {
    /// Whether the failure is worth retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(_) => true,
            BackendError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
