//! Error types for the notification pipeline.

use notification_store::StoreError;
use push_core::PayloadError;
use thiserror::Error;

/// Errors that can occur while processing notifications.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Notification store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payload could not be decoded.
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),

    /// The callback loop has shut down.
    #[error("callback dispatcher closed")]
    DispatcherClosed,
}
