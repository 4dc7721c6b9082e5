//! Bundle processor: parse, dedupe, display, persist, and notify.

use std::sync::Arc;

use notification_store::{now_unix, NewNotification, NotificationStore, PersistOutcome};
use push_core::{
    DisplayType, InFocusDisplayOption, InboundPayload, NotificationAction, NotificationDisplay,
    OpenedResult, PresentationNotification, ReceivedNotification, DEFAULT_ACTION,
};
use tracing::{debug, error, info, warn};

use crate::dedup::Deduplicator;
use crate::dispatcher::CallbackDispatcher;
use crate::routing::should_display;

/// Shared handle to the platform notification UI.
pub type SharedDisplay = Arc<dyn NotificationDisplay>;

/// Options for [`BundleProcessor::handle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleOptions {
    /// Re-displaying a stored notification: no dedupe, no persist, no callback.
    pub restoring: bool,
    /// Use this presentation id instead of a random one.
    pub override_id: Option<i32>,
    /// Show as an in-app alert instead of a system notification.
    pub show_as_alert: bool,
    /// Whether the app was in the foreground, reported to the received handler.
    pub is_app_in_focus: bool,
}

/// App state needed to route an inbound payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundContext {
    pub is_app_foreground: bool,
    pub in_focus_display: InFocusDisplayOption,
}

/// Result of processing a single payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// The payload was handled.
    Handled {
        /// Presentation id, when the notification was displayed.
        presentation_id: Option<i32>,
        /// Whether a new record was stored.
        persisted: bool,
        /// Badge count after the insert, when one happened.
        badge_count: Option<i64>,
    },
    /// The payload was skipped (not ours, malformed, or a duplicate).
    Skipped { reason: String },
}

impl ProcessResult {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled { .. })
    }
}

/// Processes inbound payloads exactly once.
#[derive(Clone)]
pub struct BundleProcessor {
    store: NotificationStore,
    dedup: Deduplicator,
    display: SharedDisplay,
    dispatcher: CallbackDispatcher,
}

impl BundleProcessor {
    pub fn new(store: NotificationStore, display: SharedDisplay, dispatcher: CallbackDispatcher) -> Self {
        Self {
            dedup: Deduplicator::new(store.clone()),
            store,
            display,
            dispatcher,
        }
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Entry point for a payload arriving from the push transport.
    ///
    /// Displayable payloads go through [`handle`](Self::handle). The rest are
    /// stored as already opened and reported to the received handler with
    /// `shown = false`.
    pub async fn process_inbound(&self, raw: &str, ctx: InboundContext) -> ProcessResult {
        let payload = match prepare(raw) {
            Ok(payload) => payload,
            Err(reason) => return ProcessResult::skipped(reason),
        };

        let display = should_display(
            payload.has_body(),
            ctx.in_focus_display.shows_while_foreground(),
            ctx.is_app_foreground,
        );

        if display {
            let options = HandleOptions {
                restoring: false,
                override_id: None,
                show_as_alert: ctx.is_app_foreground && ctx.in_focus_display.is_in_app_alert(),
                is_app_in_focus: ctx.is_app_foreground,
            };
            return self.handle_payload(payload, options).await;
        }

        self.process_silent(payload, ctx.is_app_foreground).await
    }

    /// Display a payload and, unless restoring, persist it and notify the
    /// received handler.
    pub async fn handle(&self, raw: &str, options: HandleOptions) -> ProcessResult {
        match prepare(raw) {
            Ok(payload) => self.handle_payload(payload, options).await,
            Err(reason) => ProcessResult::skipped(reason),
        }
    }

    /// Re-display notifications that were showing before a restart.
    ///
    /// Returns the number of notifications restored.
    pub async fn restore(&self) -> usize {
        let records = match self.store.restorable(now_unix()).await {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to load notifications to restore: {}", e);
                return 0;
            }
        };

        let mut restored = 0;
        for record in records {
            let options = HandleOptions {
                restoring: true,
                override_id: record.presentation_id,
                show_as_alert: false,
                is_app_in_focus: false,
            };
            if self.handle(&record.raw_payload, options).await.is_handled() {
                restored += 1;
            }
        }

        info!("Restored {} notifications", restored);
        restored
    }

    async fn handle_payload(&self, payload: InboundPayload, options: HandleOptions) -> ProcessResult {
        let Some(stable_id) = payload.stable_id().map(str::to_string) else {
            return ProcessResult::skipped("no stable id");
        };

        if !options.restoring && self.is_duplicate(&stable_id).await {
            debug!(stable_id = %stable_id, "Duplicate notification skipped");
            return ProcessResult::skipped("duplicate");
        }

        let presentation_id = options.override_id.unwrap_or_else(rand::random::<i32>);
        let notification = PresentationNotification::from_payload(&payload);

        self.display
            .display(presentation_id, &notification, options.show_as_alert)
            .await;

        if options.restoring {
            return ProcessResult::Handled {
                presentation_id: Some(presentation_id),
                persisted: false,
                badge_count: None,
            };
        }

        let record = new_record(&payload, &stable_id, Some(presentation_id), false);
        let (persisted, badge_count) = match self.persist(&record).await {
            Some(PersistOutcome::Inserted { badge_count, .. }) => (true, Some(badge_count)),
            Some(PersistOutcome::AlreadyExists) => {
                debug!(stable_id = %stable_id, "Lost insert race, not notifying");
                return ProcessResult::skipped("duplicate");
            }
            None => (false, None),
        };

        let display_type = if options.show_as_alert {
            DisplayType::InAppAlert
        } else {
            DisplayType::Notification
        };

        self.dispatcher.deliver_received(ReceivedNotification {
            presentation_id: Some(presentation_id),
            payload: notification,
            grouped_notifications: Vec::new(),
            shown: true,
            is_app_in_focus: options.is_app_in_focus,
            display_type,
        });

        ProcessResult::Handled {
            presentation_id: Some(presentation_id),
            persisted,
            badge_count,
        }
    }

    async fn process_silent(&self, payload: InboundPayload, is_app_foreground: bool) -> ProcessResult {
        let Some(stable_id) = payload.stable_id().map(str::to_string) else {
            return ProcessResult::skipped("no stable id");
        };

        if self.is_duplicate(&stable_id).await {
            debug!(stable_id = %stable_id, "Duplicate silent notification skipped");
            return ProcessResult::skipped("duplicate");
        }

        let record = new_record(&payload, &stable_id, None, true);
        let (persisted, badge_count) = match self.persist(&record).await {
            Some(PersistOutcome::Inserted { badge_count, .. }) => (true, Some(badge_count)),
            Some(PersistOutcome::AlreadyExists) => return ProcessResult::skipped("duplicate"),
            None => (false, None),
        };

        self.dispatcher.deliver_received(ReceivedNotification {
            presentation_id: None,
            payload: PresentationNotification::from_payload(&payload),
            grouped_notifications: Vec::new(),
            shown: false,
            is_app_in_focus: is_app_foreground,
            display_type: DisplayType::None,
        });

        ProcessResult::Handled {
            presentation_id: None,
            persisted,
            badge_count,
        }
    }

    async fn is_duplicate(&self, stable_id: &str) -> bool {
        match self.dedup.is_duplicate(stable_id).await {
            Ok(duplicate) => duplicate,
            Err(e) => {
                // The unique constraint still guards the insert.
                warn!(stable_id = %stable_id, "Duplicate check failed: {}", e);
                false
            }
        }
    }

    /// Persist a record and push the new badge count. `None` on store failure.
    async fn persist(&self, record: &NewNotification) -> Option<PersistOutcome> {
        match self.store.persist(record).await {
            Ok(outcome) => {
                if let PersistOutcome::Inserted { badge_count, .. } = outcome {
                    self.display.set_badge_count(badge_count).await;
                }
                Some(outcome)
            }
            Err(e) => {
                error!(stable_id = %record.stable_id, "Failed to store notification: {}", e);
                None
            }
        }
    }
}

/// Decode a payload and expand its short-key buttons.
fn prepare(raw: &str) -> Result<InboundPayload, String> {
    let mut payload = InboundPayload::from_json(raw).map_err(|e| {
        warn!("Malformed notification payload: {}", e);
        format!("malformed payload: {}", e)
    })?;

    if let Err(e) = payload.expand_action_buttons() {
        warn!("Could not expand action buttons: {}", e);
    }

    Ok(payload)
}

fn new_record(
    payload: &InboundPayload,
    stable_id: &str,
    presentation_id: Option<i32>,
    opened: bool,
) -> NewNotification {
    NewNotification {
        stable_id: stable_id.to_string(),
        group_id: payload.grp.clone(),
        opened,
        presentation_id,
        title: payload.title.clone(),
        body: payload.alert.clone().unwrap_or_default(),
        raw_payload: payload.to_json_string(),
    }
}

/// Build the opened event for a tapped notification or group summary.
///
/// The first payload is the notification itself; the rest become its grouped
/// notifications. The selected button comes from the first payload that has
/// one, and anything other than the default makes the action
/// [`ActionTaken`](push_core::ActionType::ActionTaken). `from_alert` marks a
/// tap on an in-app alert rather than a system notification.
pub fn opened_result(payloads: &[InboundPayload], is_app_in_focus: bool, from_alert: bool) -> Option<OpenedResult> {
    let (first, rest) = payloads.split_first()?;

    let action_id = payloads
        .iter()
        .find_map(InboundPayload::action_selected)
        .filter(|selected| *selected != DEFAULT_ACTION)
        .map(str::to_string);

    Some(OpenedResult {
        notification: ReceivedNotification {
            presentation_id: first.presentation_id(),
            payload: PresentationNotification::from_payload(first),
            grouped_notifications: rest.iter().map(PresentationNotification::from_payload).collect(),
            shown: true,
            is_app_in_focus,
            display_type: if from_alert {
                DisplayType::InAppAlert
            } else {
                DisplayType::Notification
            },
        },
        action: NotificationAction::from_selected(action_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use mock_collaborators::RecordingDisplay;
    use push_core::ActionType;
    use serde_json::json;

    async fn setup() -> (BundleProcessor, Arc<RecordingDisplay>, CallbackDispatcher) {
        let store = NotificationStore::connect_with_pool_size("sqlite::memory:", 1)
            .await
            .unwrap();
        store.migrate().await.unwrap();

        let display = Arc::new(RecordingDisplay::new());
        let (dispatcher, _handle) = CallbackDispatcher::spawn();
        let processor = BundleProcessor::new(store, display.clone(), dispatcher.clone());
        (processor, display, dispatcher)
    }

    fn payload(id: &str, body: &str) -> String {
        json!({
            "alert": body,
            "title": "Title",
            "grp": "g1",
            "custom": json!({"i": id, "a": {"k": "v"}}).to_string(),
        })
        .to_string()
    }

    fn collect_received(dispatcher: &CallbackDispatcher) -> Arc<Mutex<Vec<ReceivedNotification>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.set_received_handler(move |event| sink.lock().unwrap().push(event));
        seen
    }

    #[tokio::test]
    async fn test_handle_displays_persists_and_notifies() {
        let (processor, display, dispatcher) = setup().await;
        let received = collect_received(&dispatcher);

        let result = processor
            .handle(&payload("n1", "Hello"), HandleOptions::default())
            .await;
        dispatcher.flush().await.unwrap();

        let ProcessResult::Handled {
            presentation_id: Some(presentation_id),
            persisted: true,
            badge_count: Some(1),
        } = result
        else {
            panic!("unexpected result: {:?}", result);
        };

        let shown = display.displayed();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].0, presentation_id);
        assert_eq!(shown[0].1.body.as_deref(), Some("Hello"));
        assert_eq!(display.badge_counts(), vec![1]);

        let stored = processor.store().get("n1").await.unwrap().unwrap();
        assert_eq!(stored.presentation_id, Some(presentation_id));
        assert_eq!(stored.group_id.as_deref(), Some("g1"));
        assert!(!stored.opened);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].presentation_id, Some(presentation_id));
        assert!(received[0].shown);
    }

    #[tokio::test]
    async fn test_duplicate_is_noop() {
        let (processor, display, dispatcher) = setup().await;
        let received = collect_received(&dispatcher);

        processor.handle(&payload("n1", "Hello"), HandleOptions::default()).await;
        let second = processor.handle(&payload("n1", "Hello"), HandleOptions::default()).await;
        dispatcher.flush().await.unwrap();

        assert_eq!(second, ProcessResult::Skipped { reason: "duplicate".into() });
        assert_eq!(display.displayed().len(), 1);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_stable_id_has_no_side_effects() {
        let (processor, display, _dispatcher) = setup().await;

        let result = processor
            .handle(r#"{"alert":"hi","custom":{"a":{}}}"#, HandleOptions::default())
            .await;
        assert!(matches!(result, ProcessResult::Skipped { .. }));

        let result = processor.handle("not json", HandleOptions::default()).await;
        assert!(matches!(result, ProcessResult::Skipped { .. }));

        assert!(display.displayed().is_empty());
        assert_eq!(processor.store().badge_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_override_id_and_alert_flag() {
        let (processor, display, _dispatcher) = setup().await;

        let options = HandleOptions {
            override_id: Some(77),
            show_as_alert: true,
            ..Default::default()
        };
        processor.handle(&payload("n1", "Hello"), options).await;

        let shown = display.displayed();
        assert_eq!(shown[0].0, 77);
        assert!(shown[0].2);
    }

    #[tokio::test]
    async fn test_restoring_bypasses_dedupe_and_persist() {
        let (processor, display, dispatcher) = setup().await;
        let received = collect_received(&dispatcher);

        processor.handle(&payload("n1", "Hello"), HandleOptions::default()).await;
        let restoring = HandleOptions {
            restoring: true,
            override_id: Some(5),
            ..Default::default()
        };
        let result = processor.handle(&payload("n1", "Hello"), restoring).await;
        dispatcher.flush().await.unwrap();

        assert_eq!(
            result,
            ProcessResult::Handled {
                presentation_id: Some(5),
                persisted: false,
                badge_count: None
            }
        );
        assert_eq!(display.displayed().len(), 2);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_short_key_buttons_expanded_before_display() {
        let (processor, display, _dispatcher) = setup().await;

        let raw = json!({
            "alert": "Pick one",
            "custom": {"i": "btn"},
            "o": [{"n": "Yes", "i": "y", "p": "icon1"}, {"n": "No"}],
        })
        .to_string();
        processor.handle(&raw, HandleOptions::default()).await;

        let shown = display.displayed();
        let buttons = &shown[0].1.action_buttons;
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0].id, "y");
        assert_eq!(buttons[0].icon.as_deref(), Some("icon1"));
        assert_eq!(buttons[1].id, "No");

        let stored = processor.store().get("btn").await.unwrap().unwrap();
        assert!(!stored.raw_payload.contains("\"o\""));
        assert!(stored.raw_payload.contains("actionButtons"));
    }

    #[tokio::test]
    async fn test_process_inbound_routes_foreground_without_display() {
        let (processor, display, dispatcher) = setup().await;
        let received = collect_received(&dispatcher);

        let ctx = InboundContext {
            is_app_foreground: true,
            in_focus_display: InFocusDisplayOption::None,
        };
        let result = processor.process_inbound(&payload("quiet", "Hello"), ctx).await;
        dispatcher.flush().await.unwrap();

        assert_eq!(
            result,
            ProcessResult::Handled {
                presentation_id: None,
                persisted: true,
                badge_count: Some(0)
            }
        );
        assert!(display.displayed().is_empty());

        let stored = processor.store().get("quiet").await.unwrap().unwrap();
        assert!(stored.opened);
        assert_eq!(stored.presentation_id, None);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].shown);
        assert_eq!(received[0].display_type, DisplayType::None);
        assert!(received[0].is_app_in_focus);
    }

    #[tokio::test]
    async fn test_process_inbound_foreground_alert() {
        let (processor, display, _dispatcher) = setup().await;

        let ctx = InboundContext {
            is_app_foreground: true,
            in_focus_display: InFocusDisplayOption::InAppAlert,
        };
        processor.process_inbound(&payload("a", "Hello"), ctx).await;

        let background = InboundContext {
            is_app_foreground: false,
            in_focus_display: InFocusDisplayOption::InAppAlert,
        };
        processor.process_inbound(&payload("b", "Hello"), background).await;

        let shown = display.displayed();
        assert_eq!(shown.len(), 2);
        assert!(shown[0].2);
        assert!(!shown[1].2);
    }

    #[tokio::test]
    async fn test_process_inbound_bodyless_is_silent() {
        let (processor, display, _dispatcher) = setup().await;

        let raw = json!({"custom": {"i": "data-only", "a": {"x": 1}}}).to_string();
        let result = processor
            .process_inbound(&raw, InboundContext::default())
            .await;

        assert!(result.is_handled());
        assert!(display.displayed().is_empty());
        assert!(processor.store().get("data-only").await.unwrap().unwrap().opened);
    }

    #[tokio::test]
    async fn test_restore_redisplays_with_stored_ids() {
        let (processor, display, _dispatcher) = setup().await;

        let options = HandleOptions {
            override_id: Some(10),
            ..Default::default()
        };
        processor.handle(&payload("r1", "One"), options).await;
        let options = HandleOptions {
            override_id: Some(11),
            ..Default::default()
        };
        processor.handle(&payload("r2", "Two"), options).await;
        processor.store().mark_opened(&["r2".to_string()]).await.unwrap();

        let restored = processor.restore().await;
        assert_eq!(restored, 1);

        let shown = display.displayed();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[2].0, 10);
    }

    #[test]
    fn test_opened_result_grouping_and_action() {
        let first = InboundPayload::from_value(json!({
            "alert": "first",
            "custom": {"i": "a"},
            "actionSelected": "reply"
        }))
        .unwrap();
        let second = InboundPayload::from_value(json!({"alert": "second", "custom": {"i": "b"}})).unwrap();

        let result = opened_result(&[first, second], false, false).unwrap();
        assert_eq!(result.action.kind, ActionType::ActionTaken);
        assert_eq!(result.notification.display_type, DisplayType::Notification);
        assert_eq!(result.action.action_id.as_deref(), Some("reply"));
        assert_eq!(result.notification.grouped_notifications.len(), 1);
        assert_eq!(
            result.notification.grouped_notifications[0].body.as_deref(),
            Some("second")
        );

        let default = InboundPayload::from_value(json!({
            "alert": "x",
            "custom": {"i": "c"},
            "actionSelected": DEFAULT_ACTION
        }))
        .unwrap();
        let result = opened_result(&[default], true, true).unwrap();
        assert_eq!(result.action.kind, ActionType::Opened);
        assert_eq!(result.notification.display_type, DisplayType::InAppAlert);
        assert!(result.notification.shown);

        assert!(opened_result(&[], false, true).is_none());
    }

    #[test]
    fn test_opened_result_presentation_id_and_grouped_action() {
        let summary = InboundPayload::from_value(json!({
            "alert": "summary",
            "custom": {"i": "s"},
            "notificationId": 4242
        }))
        .unwrap();
        let child = InboundPayload::from_value(json!({
            "alert": "child",
            "custom": {"i": "c"},
            "actionSelected": "archive"
        }))
        .unwrap();

        let result = opened_result(&[summary, child], false, false).unwrap();
        assert_eq!(result.notification.presentation_id, Some(4242));
        assert_eq!(result.action.kind, ActionType::ActionTaken);
        assert_eq!(result.action.action_id.as_deref(), Some("archive"));

        let untagged = InboundPayload::from_value(json!({"alert": "x", "custom": {"i": "u"}})).unwrap();
        let result = opened_result(&[untagged], false, false).unwrap();
        assert_eq!(result.notification.presentation_id, None);
        assert_eq!(result.action.kind, ActionType::Opened);
    }
}
