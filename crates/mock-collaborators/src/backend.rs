//! In-memory push backend.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use backend_client::{BackendError, PlayerResponse, PushBackend, RemoteParams};
use serde_json::{json, Value};
use tokio::time::sleep;

/// A call received by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    FetchParams {
        player_id: Option<String>,
    },
    CreatePlayer(Value),
    UpdatePlayer {
        player_id: String,
        body: Value,
    },
    OnSession {
        player_id: String,
        body: Value,
    },
    OnFocus {
        player_id: String,
        active_time: i64,
        net_type: Option<i32>,
    },
    PostNotification(Value),
    NotificationOpened {
        notification_id: String,
        player_id: String,
    },
    OnPurchase {
        player_id: String,
        purchases: Value,
        existing: bool,
    },
}

/// Records every call and answers from configured state.
#[derive(Debug)]
pub struct MockBackend {
    app_id: String,
    player_id: String,
    params: RemoteParams,
    params_failures: AtomicU32,
    params_delay: Duration,
    player_delay: Duration,
    fail_players: AtomicBool,
    fail_updates: AtomicBool,
    fail_focus: AtomicBool,
    calls: Mutex<Vec<BackendCall>>,
    params_calls: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-app")
    }
}

impl MockBackend {
    /// A backend that accepts everything and assigns player id `player-1`.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            player_id: "player-1".to_string(),
            params: RemoteParams::default(),
            params_failures: AtomicU32::new(0),
            params_delay: Duration::ZERO,
            player_delay: Duration::ZERO,
            fail_players: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fail_focus: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            params_calls: AtomicUsize::new(0),
        }
    }

    /// Player id handed out by `create_player`.
    pub fn with_player_id(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = player_id.into();
        self
    }

    /// Remote params returned once fetching succeeds.
    pub fn with_params(mut self, params: RemoteParams) -> Self {
        self.params = params;
        self
    }

    /// Fail the first `failures` remote param fetches.
    pub fn with_params_failures(self, failures: u32) -> Self {
        self.params_failures.store(failures, Ordering::SeqCst);
        self
    }

    /// Delay every remote param fetch.
    pub fn with_params_delay(mut self, delay: Duration) -> Self {
        self.params_delay = delay;
        self
    }

    /// Delay player create/update/session calls.
    pub fn with_player_delay(mut self, delay: Duration) -> Self {
        self.player_delay = delay;
        self
    }

    /// Make player create/update/session calls fail.
    pub fn set_fail_players(&self, fail: bool) {
        self.fail_players.store(fail, Ordering::SeqCst);
    }

    /// Make tag/state updates (`PUT players/{id}`) fail.
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make `on_focus` fail.
    pub fn set_fail_focus(&self, fail: bool) {
        self.fail_focus.store(fail, Ordering::SeqCst);
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of remote param fetch attempts.
    pub fn params_calls(&self) -> usize {
        self.params_calls.load(Ordering::SeqCst)
    }

    /// Number of create/update/session calls.
    pub fn player_syncs(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    BackendCall::CreatePlayer(_)
                        | BackendCall::UpdatePlayer { .. }
                        | BackendCall::OnSession { .. }
                )
            })
            .count()
    }

    /// Bodies of `PUT players/{id}` calls.
    pub fn updates(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::UpdatePlayer { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn unavailable() -> BackendError {
        BackendError::Status {
            status: 503,
            body: "mock backend unavailable".to_string(),
        }
    }

    async fn player_call(&self) -> Result<(), BackendError> {
        if !self.player_delay.is_zero() {
            sleep(self.player_delay).await;
        }
        if self.fail_players.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(())
    }
}

#[async_trait]
impl PushBackend for MockBackend {
    fn app_id(&self) -> &str {
        &self.app_id
    }

    async fn fetch_remote_params(&self, player_id: Option<&str>) -> Result<RemoteParams, BackendError> {
        self.params_calls.fetch_add(1, Ordering::SeqCst);
        self.record(BackendCall::FetchParams {
            player_id: player_id.map(str::to_string),
        });

        if !self.params_delay.is_zero() {
            sleep(self.params_delay).await;
        }

        let remaining = self.params_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.params_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Self::unavailable());
        }
        Ok(self.params.clone())
    }

    async fn create_player(&self, body: &Value) -> Result<PlayerResponse, BackendError> {
        self.record(BackendCall::CreatePlayer(body.clone()));
        self.player_call().await?;
        Ok(PlayerResponse {
            success: Some(true),
            id: Some(self.player_id.clone()),
        })
    }

    async fn update_player(&self, player_id: &str, body: &Value) -> Result<(), BackendError> {
        self.record(BackendCall::UpdatePlayer {
            player_id: player_id.to_string(),
            body: body.clone(),
        });
        self.player_call().await?;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(())
    }

    async fn on_session(&self, player_id: &str, body: &Value) -> Result<PlayerResponse, BackendError> {
        self.record(BackendCall::OnSession {
            player_id: player_id.to_string(),
            body: body.clone(),
        });
        self.player_call().await?;
        Ok(PlayerResponse {
            success: Some(true),
            id: None,
        })
    }

    async fn on_focus(
        &self,
        player_id: &str,
        active_time: i64,
        net_type: Option<i32>,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::OnFocus {
            player_id: player_id.to_string(),
            active_time,
            net_type,
        });
        if self.fail_focus.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(())
    }

    async fn post_notification(&self, body: &Value) -> Result<Value, BackendError> {
        self.record(BackendCall::PostNotification(body.clone()));
        if body.get("include_player_ids").is_some_and(|ids| ids == &json!([])) {
            return Err(BackendError::Rejected(
                r#"["All included players are not subscribed"]"#.to_string(),
            ));
        }
        Ok(json!({"id": "mock-notification", "recipients": 1}))
    }

    async fn notification_opened(&self, notification_id: &str, player_id: &str) -> Result<(), BackendError> {
        self.record(BackendCall::NotificationOpened {
            notification_id: notification_id.to_string(),
            player_id: player_id.to_string(),
        });
        Ok(())
    }

    async fn on_purchase(
        &self,
        player_id: &str,
        purchases: &Value,
        existing: bool,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::OnPurchase {
            player_id: player_id.to_string(),
            purchases: purchases.clone(),
            existing,
        });
        Ok(())
    }
}
