//! Mock collaborators for testing the push SDK core.
//!
//! This crate provides in-memory implementations of the platform and backend
//! seams:
//! - `MockRegistrar` - Returns a fixed push registration outcome
//! - `DelayedRegistrar` - Wraps another registrar with artificial delay
//! - `MockLocation` - Returns a fixed location (or none)
//! - `RecordingDisplay` - Records displays, cancels, and badge updates
//! - `MockBackend` - Records backend calls and answers from configured state
//!
//! # Example
//!
//! ```rust
//! use mock_collaborators::{MockRegistrar, PushRegistrar};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registrar = MockRegistrar::succeeding("token-1");
//!
//!     let outcome = registrar.register(None).await;
//!     assert!(outcome.is_success());
//! }
//! ```

mod backend;
mod display;
mod location;
mod registrar;

// Re-export the seams for convenience
pub use backend_client::PushBackend;
pub use push_core::{async_trait, LocationProvider, NotificationDisplay, PushRegistrar};

// Export mock implementations
pub use backend::{BackendCall, MockBackend};
pub use display::RecordingDisplay;
pub use location::MockLocation;
pub use registrar::{DelayedRegistrar, MockRegistrar};
