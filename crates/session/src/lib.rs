//! Session coordination for the push SDK.
//!
//! This crate ties the store, the notification pipeline, and the backend
//! client together behind [`PushSdk`]:
//!
//! - [`ReadinessGate`] waits for push registration, location, and remote
//!   params, then syncs user state exactly once per cycle
//! - [`StateSynchronizer`] creates/updates the backend player and sends tag deltas
//! - [`FocusTracker`] decides session boundaries and reports active time
//! - [`TagState`] keeps the confirmed server tags and the pending delta
//!
//! # Architecture
//!
//! ```text
//! on_app_focus / init
//!          ↓
//! ┌──────────────────────── ReadinessGate ────────────────────────┐
//! │  push_registration ─┐                                         │
//! │  location ──────────┼──→ all ready? ──→ StateSynchronizer     │
//! │  remote_params ─────┘   (once per cycle)   POST/PUT players   │
//! └───────────────────────────────────────────────────────────────┘
//!
//! push payload ──→ BundleProcessor ──→ store + display ──→ CallbackDispatcher
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use backend_client::BackendClient;
//! use session::{Collaborators, PushSdk, SdkConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SdkConfig::from_env()?;
//!     let backend = Arc::new(BackendClient::new(config.backend.clone())?);
//!
//!     let sdk = PushSdk::init(config, Collaborators {
//!         registrar: Arc::new(MyRegistrar),
//!         location: Arc::new(MyLocation),
//!         display: Arc::new(MyDisplay),
//!         backend,
//!     })
//!     .await?;
//!
//!     sdk.set_opened_handler(|opened| println!("opened: {:?}", opened.action));
//!     sdk.send_tag("level", 3).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod focus;
mod gate;
mod sdk;
mod state;
mod synchronizer;
mod tags;

pub use config::{SdkConfig, DEFAULT_DATABASE_URL};
pub use error::SessionError;
pub use focus::{now_ms, FocusReport, FocusTracker};
pub use gate::{
    fetch_params_with_retry, GateConfig, GateDeps, GateHandle, GatePhase, GateSeed, GateStatus,
    ReadinessGate,
};
pub use sdk::{Collaborators, PushSdk};
pub use state::{allowed_packages, merge_subscribable_status, notification_types, UserState, UNSUBSCRIBED};
pub use synchronizer::{SharedBackend, StateSynchronizer};
pub use tags::TagState;

// Re-export for convenience
pub use notification_pipeline::{ProcessResult, SharedDisplay};
pub use push_core::{InFocusDisplayOption, OpenedResult, ReceivedNotification};
