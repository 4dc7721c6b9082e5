//! Configuration types for backend-client.

use std::env;
use std::time::Duration;

/// Configuration for talking to the push backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the REST API (e.g., "http://localhost:8080/api/v1").
    pub base_url: String,
    /// Application id sent with every request that needs one.
    pub app_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl BackendConfig {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a new configuration with the given base URL and app id.
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// - `PUSH_API_URL`: base URL (default: http://localhost:8080/api/v1)
    /// - `PUSH_APP_ID`: application id (default: empty)
    /// - `PUSH_HTTP_TIMEOUT_SECS`: request timeout (default: 30)
    pub fn from_env() -> Self {
        let base_url =
            env::var("PUSH_API_URL").unwrap_or_else(|_| "http://localhost:8080/api/v1".to_string());
        let app_id = env::var("PUSH_APP_ID").unwrap_or_default();
        let timeout = env::var("PUSH_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_TIMEOUT);

        Self::new(base_url, app_id).with_timeout(timeout)
    }

    /// Remote config endpoint, optionally scoped to a known player.
    pub fn android_params_url(&self, player_id: Option<&str>) -> String {
        let app_id = urlencoding::encode(&self.app_id);
        match player_id {
            Some(id) => format!(
                "{}/apps/{}/android_params.js?player_id={}",
                self.base_url,
                app_id,
                urlencoding::encode(id)
            ),
            None => format!("{}/apps/{}/android_params.js", self.base_url, app_id),
        }
    }

    /// Player creation endpoint.
    pub fn players_url(&self) -> String {
        format!("{}/players", self.base_url)
    }

    /// Endpoint for a single player.
    pub fn player_url(&self, player_id: &str) -> String {
        format!("{}/players/{}", self.base_url, urlencoding::encode(player_id))
    }

    /// New-session endpoint for a player.
    pub fn on_session_url(&self, player_id: &str) -> String {
        format!("{}/on_session", self.player_url(player_id))
    }

    /// Active-time endpoint for a player.
    pub fn on_focus_url(&self, player_id: &str) -> String {
        format!("{}/on_focus", self.player_url(player_id))
    }

    /// Purchase endpoint for a player.
    pub fn on_purchase_url(&self, player_id: &str) -> String {
        format!("{}/on_purchase", self.player_url(player_id))
    }

    /// Notification creation endpoint.
    pub fn notifications_url(&self) -> String {
        format!("{}/notifications", self.base_url)
    }

    /// Endpoint for a single notification.
    pub fn notification_url(&self, notification_id: &str) -> String {
        format!(
            "{}/notifications/{}",
            self.base_url,
            urlencoding::encode(notification_id)
        )
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080/api/v1", "")
    }
}
