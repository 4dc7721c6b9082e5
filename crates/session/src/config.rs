//! SDK configuration.

use std::env;
use std::time::Duration;

use backend_client::{BackendConfig, RetryPolicy};
use push_core::{DeviceInfo, InFocusDisplayOption};

use crate::error::SessionError;

/// Default SQLite location for the notification store.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:push_sdk.db?mode=rwc";

/// Configuration for [`PushSdk`](crate::PushSdk).
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Application id registered with the backend.
    pub app_id: String,
    /// Push transport project number. When unset, the sender id from remote
    /// params (cached from a previous run) is used.
    pub sender_id: Option<String>,
    /// sqlx connection URL for the notification store.
    pub database_url: String,
    /// How notifications are shown while the app is foregrounded.
    pub in_focus_display: InFocusDisplayOption,
    /// Ask for location permission on the first cycle that needs a fix.
    pub prompt_location: bool,
    /// Report the device location with the user state.
    pub share_location: bool,
    /// Whether the host app is in the foreground when the SDK starts.
    pub start_in_foreground: bool,
    pub backend: BackendConfig,
    /// Backoff for remote param fetches.
    pub retry: RetryPolicy,
    /// Minimum gap since the last session before a focus counts as a new session.
    pub session_threshold: Duration,
    /// Active time below which `on_focus` reports are held back.
    pub min_focus_report: Duration,
    /// Abandon a readiness cycle that has not completed within this time.
    pub cycle_timeout: Option<Duration>,
    pub device: DeviceInfo,
}

impl SdkConfig {
    /// Default session threshold (30 seconds).
    pub const DEFAULT_SESSION_THRESHOLD: Duration = Duration::from_secs(30);

    /// Default minimum active time before reporting focus (60 seconds).
    pub const DEFAULT_MIN_FOCUS_REPORT: Duration = Duration::from_secs(60);

    /// Create a configuration for `app_id` with default settings.
    pub fn new(app_id: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            app_id: app_id.into(),
            sender_id: None,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            in_focus_display: InFocusDisplayOption::default(),
            prompt_location: false,
            share_location: true,
            start_in_foreground: true,
            backend,
            retry: RetryPolicy::default(),
            session_threshold: Self::DEFAULT_SESSION_THRESHOLD,
            min_focus_report: Self::DEFAULT_MIN_FOCUS_REPORT,
            cycle_timeout: None,
            device: DeviceInfo::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PUSH_APP_ID` - Application id (required)
    /// - `PUSH_SENDER_ID` - Push transport project number
    /// - `PUSH_DATABASE_URL` - Store location (default: `sqlite:push_sdk.db?mode=rwc`)
    /// - `PUSH_IN_FOCUS_DISPLAY` - `none`, `in_app_alert`, or `notification`
    /// - `PUSH_PROMPT_LOCATION` - Prompt for location permission (default: false)
    /// - `PUSH_SHARE_LOCATION` - Report location (default: true)
    ///
    /// Backend and retry settings come from [`BackendConfig::from_env`] and
    /// [`RetryPolicy::from_env`].
    pub fn from_env() -> Result<Self, SessionError> {
        let app_id = env::var("PUSH_APP_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| SessionError::Config("PUSH_APP_ID is required".to_string()))?;

        let mut config = Self::new(app_id.clone(), BackendConfig::from_env());
        config.backend.app_id = app_id;
        config.retry = RetryPolicy::from_env();

        if let Ok(sender_id) = env::var("PUSH_SENDER_ID") {
            if !sender_id.trim().is_empty() {
                config.sender_id = Some(sender_id);
            }
        }
        if let Ok(url) = env::var("PUSH_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(option) = env::var("PUSH_IN_FOCUS_DISPLAY") {
            config.in_focus_display = option.parse().map_err(SessionError::Config)?;
        }
        if let Some(prompt) = env_flag("PUSH_PROMPT_LOCATION") {
            config.prompt_location = prompt;
        }
        if let Some(share) = env_flag("PUSH_SHARE_LOCATION") {
            config.share_location = share;
        }

        Ok(config)
    }

    pub fn with_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_in_focus_display(mut self, option: InFocusDisplayOption) -> Self {
        self.in_focus_display = option;
        self
    }

    /// Set whether location is shared and whether the first fix may prompt.
    pub fn with_location(mut self, share: bool, prompt: bool) -> Self {
        self.share_location = share;
        self.prompt_location = prompt;
        self
    }

    pub fn with_start_in_foreground(mut self, foreground: bool) -> Self {
        self.start_in_foreground = foreground;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = Some(timeout);
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let value = env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SdkConfig::new("app", BackendConfig::new("http://localhost/api/v1", "app"));

        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.share_location);
        assert!(!config.prompt_location);
        assert_eq!(config.in_focus_display, InFocusDisplayOption::InAppAlert);
        assert_eq!(config.session_threshold, Duration::from_secs(30));
        assert_eq!(config.min_focus_report, Duration::from_secs(60));
        assert!(config.cycle_timeout.is_none());
    }

    #[test]
    fn test_builders() {
        let config = SdkConfig::new("app", BackendConfig::new("http://localhost", "app"))
            .with_sender_id("123")
            .with_database_url("sqlite::memory:")
            .with_location(false, true)
            .with_cycle_timeout(Duration::from_secs(90));

        assert_eq!(config.sender_id.as_deref(), Some("123"));
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(!config.share_location);
        assert!(config.prompt_location);
        assert_eq!(config.cycle_timeout, Some(Duration::from_secs(90)));
    }
}
