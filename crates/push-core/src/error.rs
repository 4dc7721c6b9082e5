//! Error types for payload decoding.

use thiserror::Error;

/// Errors that can occur while decoding an inbound payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload is not valid JSON or does not match the schema.
    #[error("invalid payload JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload decoded to something other than a JSON object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// The short-key action button array could not be expanded.
    #[error("invalid action buttons: {0}")]
    InvalidButtons(String),
}
