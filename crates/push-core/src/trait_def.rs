//! Platform collaborator traits.
//!
//! The concrete push transport, location services, and notification UI live
//! in the host platform. The SDK core talks to them only through these traits.

use async_trait::async_trait;

use crate::presentation::PresentationNotification;

/// Result of a push-token registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// The push token, when registration succeeded.
    pub token: Option<String>,
    /// Subscribable status: `1` for success, `< 1` for an error code.
    pub status: i32,
}

impl RegistrationOutcome {
    /// A successful registration.
    pub fn success(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            status: 1,
        }
    }

    /// A failed registration with the given error status.
    pub fn failure(status: i32) -> Self {
        Self {
            token: None,
            status,
        }
    }

    /// Whether the registration produced a usable token.
    pub fn is_success(&self) -> bool {
        self.status >= 1 && self.token.is_some()
    }
}

/// A location fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
    pub accuracy: Option<f32>,
    /// Provider-specific fix type (coarse / fine).
    pub kind: Option<i32>,
}

/// Obtains a push token from the platform push transport.
#[async_trait]
pub trait PushRegistrar: Send + Sync {
    /// Register for a push token.
    ///
    /// `sender_id` is the transport project number, when known.
    async fn register(&self, sender_id: Option<&str>) -> RegistrationOutcome;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Obtains the device location.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Fetch the current location, prompting the user for permission if `prompt` is set.
    ///
    /// Returns `None` when no fix is available or permission was denied.
    async fn location(&self, prompt: bool) -> Option<Location>;
}

/// Renders notifications on the platform.
#[async_trait]
pub trait NotificationDisplay: Send + Sync {
    /// Show a notification under the given presentation id.
    ///
    /// `as_alert` selects an in-app alert instead of a system notification.
    async fn display(
        &self,
        presentation_id: i32,
        notification: &PresentationNotification,
        as_alert: bool,
    );

    /// Remove a displayed notification.
    ///
    /// Default implementation does nothing.
    async fn cancel(&self, presentation_id: i32) {
        let _ = presentation_id;
    }

    /// Update the unread badge count.
    ///
    /// Default implementation does nothing.
    async fn set_badge_count(&self, count: i64) {
        let _ = count;
    }
}
