//! Push backend HTTP client.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::types::{OnFocusBody, OpenedBody, PlayerResponse, PurchaseBody, RemoteParams};

/// The backend operations the SDK core depends on.
///
/// Implemented by [`BackendClient`] over HTTP; tests substitute an in-memory
/// recorder.
#[async_trait]
pub trait PushBackend: Send + Sync {
    /// Application id used in request bodies.
    fn app_id(&self) -> &str;

    /// Fetch remote configuration for the app.
    async fn fetch_remote_params(&self, player_id: Option<&str>) -> Result<RemoteParams, BackendError>;

    /// Create a player. The response carries the assigned id.
    async fn create_player(&self, body: &Value) -> Result<PlayerResponse, BackendError>;

    /// Update an existing player's state or tags.
    async fn update_player(&self, player_id: &str, body: &Value) -> Result<(), BackendError>;

    /// Report a new session for an existing player.
    async fn on_session(&self, player_id: &str, body: &Value) -> Result<PlayerResponse, BackendError>;

    /// Report accumulated foreground time.
    async fn on_focus(
        &self,
        player_id: &str,
        active_time: i64,
        net_type: Option<i32>,
    ) -> Result<(), BackendError>;

    /// Create a notification. A response containing `errors` is a failure.
    async fn post_notification(&self, body: &Value) -> Result<Value, BackendError>;

    /// Mark a notification as opened by this player.
    async fn notification_opened(&self, notification_id: &str, player_id: &str) -> Result<(), BackendError>;

    /// Report in-app purchases.
    async fn on_purchase(
        &self,
        player_id: &str,
        purchases: &Value,
        existing: bool,
    ) -> Result<(), BackendError>;
}

/// Client for the push backend REST API.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    config: BackendConfig,
}

impl BackendClient {
    /// Build a client from configuration.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        if config.base_url.is_empty() {
            return Err(BackendError::Config("base_url is empty".to_string()));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self { http, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Copy `body` and fill in `app_id` when the caller left it out.
    fn with_app_id(&self, body: &Value) -> Value {
        let mut body = body.clone();
        if let Value::Object(map) = &mut body {
            map.entry("app_id")
                .or_insert_with(|| Value::String(self.config.app_id.clone()));
        }
        body
    }

    /// Send a request and decode the JSON response.
    ///
    /// An empty response body decodes as `null`.
    async fn send_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<R, BackendError> {
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!("Backend returned HTTP {} for {}", status, url);
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl PushBackend for BackendClient {
    fn app_id(&self) -> &str {
        &self.config.app_id
    }

    async fn fetch_remote_params(&self, player_id: Option<&str>) -> Result<RemoteParams, BackendError> {
        let url = self.config.android_params_url(player_id);
        self.send_json::<(), _>(Method::GET, &url, None).await
    }

    async fn create_player(&self, body: &Value) -> Result<PlayerResponse, BackendError> {
        let body = self.with_app_id(body);
        let response: PlayerResponse = self
            .send_json(Method::POST, &self.config.players_url(), Some(&body))
            .await?;

        if response.id.is_none() {
            return Err(BackendError::MissingField("id"));
        }
        Ok(response)
    }

    async fn update_player(&self, player_id: &str, body: &Value) -> Result<(), BackendError> {
        let body = self.with_app_id(body);
        let _: Value = self
            .send_json(Method::PUT, &self.config.player_url(player_id), Some(&body))
            .await?;
        Ok(())
    }

    async fn on_session(&self, player_id: &str, body: &Value) -> Result<PlayerResponse, BackendError> {
        let body = self.with_app_id(body);
        let response: Option<PlayerResponse> = self
            .send_json(Method::POST, &self.config.on_session_url(player_id), Some(&body))
            .await?;
        Ok(response.unwrap_or_default())
    }

    async fn on_focus(
        &self,
        player_id: &str,
        active_time: i64,
        net_type: Option<i32>,
    ) -> Result<(), BackendError> {
        let body = OnFocusBody {
            app_id: &self.config.app_id,
            kind: 1,
            state: "ping",
            active_time,
            net_type,
        };
        let _: Value = self
            .send_json(Method::PUT, &self.config.on_focus_url(player_id), Some(&body))
            .await?;
        Ok(())
    }

    async fn post_notification(&self, body: &Value) -> Result<Value, BackendError> {
        let body = self.with_app_id(body);
        let response: Value = self
            .send_json(Method::POST, &self.config.notifications_url(), Some(&body))
            .await?;

        if let Some(errors) = response.get("errors") {
            return Err(BackendError::Rejected(errors.to_string()));
        }
        Ok(response)
    }

    async fn notification_opened(&self, notification_id: &str, player_id: &str) -> Result<(), BackendError> {
        let body = OpenedBody {
            app_id: &self.config.app_id,
            player_id,
            opened: true,
        };
        let _: Value = self
            .send_json(
                Method::PUT,
                &self.config.notification_url(notification_id),
                Some(&body),
            )
            .await?;
        Ok(())
    }

    async fn on_purchase(
        &self,
        player_id: &str,
        purchases: &Value,
        existing: bool,
    ) -> Result<(), BackendError> {
        let body = PurchaseBody {
            app_id: &self.config.app_id,
            existing,
            purchases,
        };
        let _: Value = self
            .send_json(Method::POST, &self.config.on_purchase_url(player_id), Some(&body))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("config", &self.config)
            .finish()
    }
}
