//! Core types and collaborator traits for the push notification SDK.
//!
//! This crate provides the shared vocabulary used by the store, the
//! notification pipeline, and the session layer. It defines:
//!
//! - [`InboundPayload`] - Typed schema for a raw push payload, decoded once at the boundary
//! - [`PresentationNotification`] - Read-only display model derived from a payload
//! - [`ReceivedNotification`] / [`OpenedResult`] - Events delivered to developer handlers
//! - [`PushRegistrar`], [`LocationProvider`], [`NotificationDisplay`] - Platform collaborators
//!
//! # Example
//!
//! ```rust
//! use push_core::{InboundPayload, PresentationNotification};
//!
//! let raw = r#"{"alert":"Hello","title":"Greeting","custom":"{\"i\":\"abc-123\"}"}"#;
//! let payload = InboundPayload::from_json(raw).unwrap();
//! assert_eq!(payload.stable_id(), Some("abc-123"));
//!
//! let notification = PresentationNotification::from_payload(&payload);
//! assert_eq!(notification.body.as_deref(), Some("Hello"));
//! ```

mod device;
mod error;
mod events;
mod payload;
mod presentation;
mod trait_def;

pub use device::{package_fingerprint, DeviceInfo};
pub use error::PayloadError;
pub use events::{
    ActionType, DisplayType, InFocusDisplayOption, NotificationAction, OpenedResult,
    ReceivedNotification,
};
pub use payload::{BackgroundImage, CustomData, InboundPayload, DEFAULT_ACTION, DO_NOT_COLLAPSE};
pub use presentation::{ActionButton, BackgroundImageLayout, PresentationNotification};
pub use trait_def::{Location, LocationProvider, NotificationDisplay, PushRegistrar, RegistrationOutcome};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
