//! Error types for session operations.

use backend_client::BackendError;
use notification_pipeline::PipelineError;
use notification_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Backend request failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Notification pipeline failure.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tags could not be interpreted.
    #[error("invalid tags: {0}")]
    InvalidTags(String),

    /// A notification to post was not a JSON object.
    #[error("invalid notification: {0}")]
    InvalidNotification(String),

    /// The operation needs a registered user.
    #[error("no user id registered yet")]
    NoUserId,

    /// The SDK (or one of its actors) has been shut down.
    #[error("session has been shut down")]
    ShutDown,
}
