//! The SDK context object.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notification_pipeline::{
    opened_result, BundleProcessor, CallbackDispatcher, InboundContext, ProcessResult, SharedDisplay,
};
use notification_store::NotificationStore;
use push_core::{
    InFocusDisplayOption, InboundPayload, Location, LocationProvider, OpenedResult, PushRegistrar,
    ReceivedNotification,
};
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SdkConfig;
use crate::error::SessionError;
use crate::focus::{now_ms, FocusReport, FocusTracker, INITIAL_LAST_SESSION_MS};
use crate::gate::{GateConfig, GateDeps, GateHandle, GateSeed, GateStatus, ReadinessGate};
use crate::state::{keys, notification_types};
use crate::synchronizer::{SharedBackend, StateSynchronizer};
use crate::tags::TagState;

/// Platform and backend implementations the SDK talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub registrar: Arc<dyn PushRegistrar>,
    pub location: Arc<dyn LocationProvider>,
    pub display: SharedDisplay,
    pub backend: SharedBackend,
}

/// A running push SDK instance.
///
/// Created by [`PushSdk::init`] and torn down by [`PushSdk::shutdown`].
pub struct PushSdk {
    config: SdkConfig,
    store: NotificationStore,
    backend: SharedBackend,
    display: SharedDisplay,
    location: Arc<dyn LocationProvider>,
    processor: BundleProcessor,
    dispatcher: CallbackDispatcher,
    synchronizer: StateSynchronizer,
    gate: GateHandle,
    focus: Arc<Mutex<FocusTracker>>,
    in_focus_display: RwLock<InFocusDisplayOption>,
    subscription_enabled: Arc<AtomicBool>,
    restored: AtomicBool,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl PushSdk {
    /// Start the SDK with callbacks delivered on a spawned task.
    pub async fn init(config: SdkConfig, collaborators: Collaborators) -> Result<Self, SessionError> {
        let (dispatcher, callback_loop) = CallbackDispatcher::spawn();
        Self::start(config, collaborators, dispatcher, vec![callback_loop]).await
    }

    /// Start the SDK with a dispatcher whose loop the host drives itself
    /// (see [`AffinityLoop`](notification_pipeline::AffinityLoop)).
    pub async fn init_with_dispatcher(
        config: SdkConfig,
        collaborators: Collaborators,
        dispatcher: CallbackDispatcher,
    ) -> Result<Self, SessionError> {
        Self::start(config, collaborators, dispatcher, Vec::new()).await
    }

    /// Load [`SdkConfig::from_env`] and start the SDK.
    pub async fn from_env(collaborators: Collaborators) -> Result<Self, SessionError> {
        Self::init(SdkConfig::from_env()?, collaborators).await
    }

    async fn start(
        config: SdkConfig,
        collaborators: Collaborators,
        dispatcher: CallbackDispatcher,
        mut tasks: Vec<JoinHandle<()>>,
    ) -> Result<Self, SessionError> {
        if config.app_id.trim().is_empty() {
            return Err(SessionError::Config("app id must not be empty".to_string()));
        }

        let store = open_store(&config.database_url).await?;
        let Collaborators {
            registrar,
            location,
            display,
            backend,
        } = collaborators;

        match store.setting(keys::APP_ID).await? {
            Some(saved) if saved == config.app_id => {}
            Some(saved) => {
                info!(old = %saved, new = %config.app_id, "App id changed; resetting user");
                store.remove_setting(keys::PLAYER_ID).await?;
                store.remove_setting(keys::PUSH_TOKEN).await?;
                store.remove_setting(keys::CONFIRMED_TAGS).await?;
                store.set_setting(keys::APP_ID, &config.app_id).await?;
            }
            None => {
                display.set_badge_count(0).await;
                store.set_setting(keys::APP_ID, &config.app_id).await?;
            }
        }

        let user_id = store.setting(keys::PLAYER_ID).await?;
        let push_token = store.setting(keys::PUSH_TOKEN).await?;
        let cached_sender_id = store.setting(keys::SENDER_ID).await?;
        let confirmed_tags = load_tags(&store).await?;
        let unsent_active_secs = load_number(&store, keys::UNSENT_ACTIVE_SECS, 0).await?;
        let last_session_ms = load_number(&store, keys::LAST_SESSION_MS, INITIAL_LAST_SESSION_MS).await?;
        let subscription_enabled = store.setting(keys::SUBSCRIPTION_ENABLED).await?.as_deref() != Some("false");

        let focus = Arc::new(Mutex::new(
            FocusTracker::new(config.session_threshold, config.min_focus_report)
                .with_saved(unsent_active_secs, last_session_ms),
        ));
        let subscription_enabled = Arc::new(AtomicBool::new(subscription_enabled));

        let synchronizer = StateSynchronizer::new(
            backend.clone(),
            store.clone(),
            user_id.clone(),
            TagState::with_confirmed(confirmed_tags),
            focus.clone(),
        );

        let (gate, gate_task) = ReadinessGate::spawn(
            GateConfig::from_sdk(&config),
            GateDeps {
                registrar,
                location: location.clone(),
                synchronizer: synchronizer.clone(),
                store: store.clone(),
                subscription_enabled: subscription_enabled.clone(),
            },
            GateSeed {
                push_token,
                cached_sender_id,
            },
        );
        tasks.push(gate_task);

        let processor = BundleProcessor::new(store.clone(), display.clone(), dispatcher.clone());

        let sdk = Self {
            in_focus_display: RwLock::new(config.in_focus_display),
            config,
            store,
            backend,
            display,
            location,
            processor,
            dispatcher,
            synchronizer,
            gate,
            focus,
            subscription_enabled,
            restored: AtomicBool::new(false),
            tasks: std::sync::Mutex::new(tasks),
        };

        let foreground = sdk.config.start_in_foreground;
        sdk.focus.lock().await.start_tracking(Instant::now(), foreground);

        if foreground || user_id.is_none() {
            let now = now_ms();
            let new_session = {
                let mut focus = sdk.focus.lock().await;
                let new_session = focus.is_new_session(now);
                focus.record_session(now);
                new_session
            };
            sdk.save_setting(keys::LAST_SESSION_MS, &now.to_string()).await;
            sdk.gate.trigger(new_session)?;
        }

        if foreground {
            sdk.spawn_restore();
        }

        info!(app_id = %sdk.config.app_id, user_id = ?user_id, "Push SDK initialized");
        Ok(sdk)
    }

    /// Process a payload delivered by the push transport.
    pub async fn handle_inbound(&self, raw: &str) -> ProcessResult {
        let ctx = InboundContext {
            is_app_foreground: self.focus.lock().await.is_foreground(),
            in_focus_display: *self.in_focus_display.read().await,
        };
        self.processor.process_inbound(raw, ctx).await
    }

    /// The user tapped a notification (or a group summary).
    ///
    /// `raw_payloads` holds the tapped notification first, then the rest of
    /// its group. Returns whether an opened event was dispatched.
    pub async fn handle_notification_open(&self, raw_payloads: &[&str], from_alert: bool) -> bool {
        let payloads: Vec<InboundPayload> = raw_payloads
            .iter()
            .filter_map(|raw| match InboundPayload::from_json(raw) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!("Ignoring malformed opened payload: {}", e);
                    None
                }
            })
            .collect();

        let stable_ids: Vec<String> = payloads
            .iter()
            .filter_map(|payload| payload.stable_id().map(str::to_string))
            .collect();

        if !stable_ids.is_empty() {
            match self.store.mark_opened(&stable_ids).await {
                Ok(badge) => self.display.set_badge_count(badge).await,
                Err(e) => error!("Failed to mark notifications opened: {}", e),
            }

            match self.synchronizer.user_id().await {
                Some(player_id) => {
                    for id in &stable_ids {
                        if let Err(e) = self.backend.notification_opened(id, &player_id).await {
                            warn!(stable_id = %id, "Failed to report open: {}", e);
                        }
                    }
                }
                None => debug!("No user id; open not reported"),
            }
        }

        let is_app_in_focus = self.focus.lock().await.is_foreground();
        match opened_result(&payloads, is_app_in_focus, from_alert) {
            Some(mut result) => {
                if result.notification.presentation_id.is_none() {
                    result.notification.presentation_id =
                        self.stored_presentation_id(stable_ids.first()).await;
                }
                self.dispatcher.deliver_opened(result);
                true
            }
            None => false,
        }
    }

    /// Presentation id recorded when the notification was displayed.
    async fn stored_presentation_id(&self, stable_id: Option<&String>) -> Option<i32> {
        let stable_id = stable_id?;
        match self.store.get(stable_id).await {
            Ok(record) => record.and_then(|record| record.presentation_id),
            Err(e) => {
                warn!(stable_id = %stable_id, "Failed to look up presentation id: {}", e);
                None
            }
        }
    }

    /// The host app came to the foreground.
    ///
    /// Returns whether this started a new session.
    pub async fn on_app_focus(&self) -> Result<bool, SessionError> {
        let now = now_ms();
        let new_session = self.focus.lock().await.on_focus(Instant::now(), now);
        self.save_setting(keys::LAST_SESSION_MS, &now.to_string()).await;

        self.gate.trigger(new_session)?;
        self.spawn_restore();
        Ok(new_session)
    }

    /// The host app went to the background.
    ///
    /// With `only_save`, active time is stored but never reported.
    pub async fn on_app_lost_focus(&self, only_save: bool) -> FocusReport {
        let user_id = self.synchronizer.user_id().await;
        let now = now_ms();
        let report = self
            .focus
            .lock()
            .await
            .on_lost_focus(Instant::now(), now, only_save, user_id.is_some());

        match (report, user_id) {
            (FocusReport::Ignored, _) => return report,
            (FocusReport::Saved { unsent_secs }, _) => {
                self.save_setting(keys::UNSENT_ACTIVE_SECS, &unsent_secs.to_string()).await;
            }
            (FocusReport::Send { active_secs }, Some(player_id)) => {
                let unsent = match self
                    .backend
                    .on_focus(&player_id, active_secs, self.config.device.net_type)
                    .await
                {
                    Ok(()) => {
                        debug!(active_secs, "Reported active time");
                        self.focus.lock().await.report_sent();
                        0
                    }
                    Err(e) => {
                        warn!(active_secs, "Failed to report active time: {}", e);
                        self.focus.lock().await.report_failed(active_secs);
                        active_secs
                    }
                };
                self.save_setting(keys::UNSENT_ACTIVE_SECS, &unsent.to_string()).await;
            }
            (FocusReport::Send { .. }, None) => {}
        }

        self.save_setting(keys::LAST_SESSION_MS, &now.to_string()).await;
        report
    }

    pub async fn send_tag(&self, key: &str, value: impl Into<Value>) -> Result<bool, SessionError> {
        let mut tags = Map::new();
        tags.insert(key.to_string(), value.into());
        self.send_tag_map(tags).await
    }

    /// Send a JSON object of tags.
    ///
    /// Returns whether a delta was sent now. Without a user id the delta is
    /// held and sent with the first player sync.
    pub async fn send_tags(&self, tags: Value) -> Result<bool, SessionError> {
        match tags {
            Value::Object(tags) => self.send_tag_map(tags).await,
            other => Err(SessionError::InvalidTags(format!("expected a JSON object, got {}", other))),
        }
    }

    pub async fn delete_tag(&self, key: &str) -> Result<bool, SessionError> {
        self.delete_tags(&[key]).await
    }

    pub async fn delete_tags(&self, keys: &[&str]) -> Result<bool, SessionError> {
        let tags = keys
            .iter()
            .map(|key| (key.to_string(), Value::String(String::new())))
            .collect();
        self.send_tag_map(tags).await
    }

    /// Confirmed server tags with pending changes applied.
    pub async fn get_tags(&self) -> Map<String, Value> {
        self.synchronizer.tags().await
    }

    async fn send_tag_map(&self, tags: Map<String, Value>) -> Result<bool, SessionError> {
        self.synchronizer.stage_tags(&tags).await;
        self.synchronizer.flush_tags().await
    }

    /// `POST notifications`, filling in `app_id` when missing.
    pub async fn post_notification(&self, notification: Value) -> Result<Value, SessionError> {
        let Value::Object(mut body) = notification else {
            return Err(SessionError::InvalidNotification(
                "notification must be a JSON object".to_string(),
            ));
        };
        body.entry("app_id").or_insert_with(|| json!(self.config.app_id));

        Ok(self.backend.post_notification(&Value::Object(body)).await?)
    }

    /// Report in-app purchases. Returns `false` without a user id.
    pub async fn send_purchases(&self, purchases: Value, existing: bool) -> Result<bool, SessionError> {
        let Some(player_id) = self.synchronizer.user_id().await else {
            debug!("No user id; purchases not sent");
            return Ok(false);
        };

        self.backend.on_purchase(&player_id, &purchases, existing).await?;
        Ok(true)
    }

    /// Opt the user in or out of notifications.
    ///
    /// Returns whether the change was sent now; otherwise it goes with the
    /// next player sync.
    pub async fn set_subscription(&self, enabled: bool) -> Result<bool, SessionError> {
        self.subscription_enabled.store(enabled, Ordering::SeqCst);
        self.store
            .set_setting(keys::SUBSCRIPTION_ENABLED, if enabled { "true" } else { "false" })
            .await?;

        let status = self.gate.status().await?.subscribable_status;
        let fields = json!({ "notification_types": notification_types(status, enabled) });
        self.synchronizer.update_fields(fields).await
    }

    pub async fn set_in_focus_displaying(&self, option: InFocusDisplayOption) {
        *self.in_focus_display.write().await = option;
    }

    /// Change whether later readiness cycles collect the location.
    pub fn set_location_shared(&self, shared: bool) -> Result<(), SessionError> {
        self.gate.set_location_shared(shared)
    }

    /// Ask for location permission now and report the fix if one arrives.
    pub async fn prompt_location(&self) -> Result<Option<Location>, SessionError> {
        let Some(location) = self.location.location(true).await else {
            return Ok(None);
        };

        let mut fields = json!({ "lat": location.lat, "long": location.long });
        if let Some(fields) = fields.as_object_mut() {
            if let Some(accuracy) = location.accuracy {
                fields.insert("loc_acc".into(), json!(accuracy));
            }
            if let Some(kind) = location.kind {
                fields.insert("loc_type".into(), json!(kind));
            }
        }
        self.synchronizer.update_fields(fields).await?;
        Ok(Some(location))
    }

    pub fn set_received_handler<F>(&self, handler: F)
    where
        F: FnMut(ReceivedNotification) + Send + 'static,
    {
        self.dispatcher.set_received_handler(handler);
    }

    /// Install the opened handler; opens that arrived earlier are replayed.
    pub fn set_opened_handler<F>(&self, handler: F)
    where
        F: FnMut(OpenedResult) + Send + 'static,
    {
        self.dispatcher.set_opened_handler(handler);
    }

    pub fn clear_handlers(&self) {
        self.dispatcher.clear_handlers();
    }

    /// Wait until callbacks queued so far have been handled.
    pub async fn flush_callbacks(&self) -> Result<(), SessionError> {
        Ok(self.dispatcher.flush().await?)
    }

    /// Dismiss every unread notification and cancel what is on screen.
    ///
    /// Returns the number of records dismissed.
    pub async fn clear_notifications(&self) -> Result<u64, SessionError> {
        for presentation_id in self.store.active_presentation_ids().await? {
            self.display.cancel(presentation_id).await;
        }
        let dismissed = self.store.dismiss_all().await?;
        self.display.set_badge_count(0).await;
        Ok(dismissed)
    }

    /// Dismiss and cancel one notification. Returns the new badge count.
    pub async fn cancel_notification(&self, presentation_id: i32) -> Result<i64, SessionError> {
        let badge = self.store.dismiss_presentation(presentation_id).await?;
        self.display.cancel(presentation_id).await;
        self.display.set_badge_count(badge).await;
        Ok(badge)
    }

    /// The backend player id, once assigned.
    pub async fn user_id(&self) -> Option<String> {
        self.synchronizer.user_id().await
    }

    pub async fn gate_status(&self) -> Result<GateStatus, SessionError> {
        self.gate.status().await
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Stop background work and close the store.
    pub async fn shutdown(&self) {
        self.gate.shutdown().await;
        self.dispatcher.clear_handlers();

        let tasks = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            task.abort();
        }

        self.store.close().await;
        info!("Push SDK shut down");
    }

    /// Re-display stored notifications, once per process.
    fn spawn_restore(&self) {
        if self.restored.swap(true, Ordering::SeqCst) {
            return;
        }

        let processor = self.processor.clone();
        let task = tokio::spawn(
            async move {
                let restored = processor.restore().await;
                if restored > 0 {
                    info!(restored, "Restored notifications");
                }
            }
            .instrument(info_span!("restore")),
        );

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.retain(|task| !task.is_finished());
            tasks.push(task);
        }
    }

    async fn save_setting(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set_setting(key, value).await {
            warn!(key, "Failed to save setting: {}", e);
        }
    }
}

async fn open_store(url: &str) -> Result<NotificationStore, SessionError> {
    let store = if url.contains(":memory:") || url.contains("mode=memory") {
        NotificationStore::connect_with_pool_size(url, 1).await?
    } else {
        NotificationStore::connect(url).await?
    };
    store.migrate().await?;
    Ok(store)
}

async fn load_tags(store: &NotificationStore) -> Result<Map<String, Value>, SessionError> {
    let Some(raw) = store.setting(keys::CONFIRMED_TAGS).await? else {
        return Ok(Map::new());
    };
    match serde_json::from_str(&raw) {
        Ok(tags) => Ok(tags),
        Err(e) => {
            warn!("Discarding unreadable saved tags: {}", e);
            Ok(Map::new())
        }
    }
}

async fn load_number(store: &NotificationStore, key: &str, default: i64) -> Result<i64, SessionError> {
    Ok(store
        .setting(key)
        .await?
        .and_then(|value| value.parse().ok())
        .unwrap_or(default))
}
