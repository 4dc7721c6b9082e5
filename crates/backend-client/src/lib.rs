//! Push backend client library.
//!
//! This crate provides a Rust client for the push backend's REST API. It
//! supports:
//!
//! - Fetching remote app configuration
//! - Creating and updating players, reporting sessions and active time
//! - Posting notifications and reporting opens and purchases
//!
//! The [`PushBackend`] trait is the seam the SDK core depends on; the
//! [`RetryPolicy`] drives remote config retries.
//!
//! # Example
//!
//! ```no_run
//! use backend_client::{BackendClient, BackendConfig, PushBackend};
//!
//! # async fn example() -> Result<(), backend_client::BackendError> {
//! let client = BackendClient::new(BackendConfig::from_env())?;
//!
//! let params = client.fetch_remote_params(None).await?;
//! println!("Sender id: {:?}", params.android_sender_id);
//!
//! let created = client
//!     .create_player(&serde_json::json!({ "device_type": 1 }))
//!     .await?;
//! println!("Player: {:?}", created.id);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use client::{BackendClient, PushBackend};
pub use config::BackendConfig;
pub use error::BackendError;
pub use retry::RetryPolicy;
pub use types::{PlayerResponse, RemoteParams};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
