//! Integration tests for the session crate.
//!
//! Every collaborator is a mock and the store is in-memory SQLite, so these
//! run without a backend or a device.
//!
//! Run all integration tests:
//!   cargo test -p session --test integration_tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use backend_client::{BackendConfig, RetryPolicy};
use mock_collaborators::{BackendCall, MockBackend, MockLocation, MockRegistrar, RecordingDisplay};
use push_core::{ActionType, DisplayType, InFocusDisplayOption};
use serde_json::json;
use session::{Collaborators, FocusReport, GatePhase, ProcessResult, PushSdk, SdkConfig, SessionError};

struct Harness {
    sdk: PushSdk,
    backend: Arc<MockBackend>,
    display: Arc<RecordingDisplay>,
}

fn config(database_url: &str) -> SdkConfig {
    SdkConfig::new("app-1", BackendConfig::new("http://localhost:0/api/v1", "app-1"))
        .with_database_url(database_url)
        .with_retry(RetryPolicy::fixed(Duration::from_millis(10), Duration::ZERO))
}

async fn start_with(config: SdkConfig, backend: Arc<MockBackend>) -> Harness {
    let display = Arc::new(RecordingDisplay::new());
    let sdk = PushSdk::init(
        config,
        Collaborators {
            registrar: Arc::new(MockRegistrar::succeeding("tok")),
            location: Arc::new(MockLocation::at(52.5, 13.4)),
            display: display.clone(),
            backend: backend.clone(),
        },
    )
    .await
    .unwrap();

    Harness { sdk, backend, display }
}

async fn start() -> Harness {
    start_with(config("sqlite::memory:"), Arc::new(MockBackend::new("app-1"))).await
}

/// Wait for the first readiness cycle to assign a player id.
async fn wait_for_user(sdk: &PushSdk) -> String {
    for _ in 0..300 {
        let status = sdk.gate_status().await.unwrap();
        if let (Some(id), GatePhase::Idle) = (sdk.user_id().await, status.phase) {
            return id;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no user id assigned");
}

fn payload(id: &str, body: &str) -> String {
    json!({"alert": body, "title": "Title", "custom": {"i": id}}).to_string()
}

fn temp_db_url(name: &str) -> (String, std::path::PathBuf) {
    let path = std::env::temp_dir().join(format!(
        "push_sdk_{}_{}_{}.db",
        name,
        std::process::id(),
        session::now_ms()
    ));
    (format!("sqlite://{}?mode=rwc", path.display()), path)
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_init_registers_player() {
        let h = start().await;

        let user_id = wait_for_user(&h.sdk).await;
        assert_eq!(user_id, "player-1");

        match h.backend.calls().iter().find(|call| matches!(call, BackendCall::CreatePlayer(_))) {
            Some(BackendCall::CreatePlayer(body)) => {
                assert_eq!(body["app_id"], "app-1");
                assert_eq!(body["identifier"], "tok");
                assert_eq!(body["lat"], 52.5);
            }
            other => panic!("expected player creation, got {:?}", other),
        }

        // First run resets the badge.
        assert_eq!(h.display.badge_counts().first(), Some(&0));
        h.sdk.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_app_id_rejected() {
        let mut config = config("sqlite::memory:");
        config.app_id = "  ".into();

        let result = PushSdk::init(
            config,
            Collaborators {
                registrar: Arc::new(MockRegistrar::succeeding("tok")),
                location: Arc::new(MockLocation::unavailable()),
                display: Arc::new(RecordingDisplay::new()),
                backend: Arc::new(MockBackend::new("app-1")),
            },
        )
        .await;

        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[tokio::test]
    async fn test_app_id_change_resets_user() {
        let (url, path) = temp_db_url("app_change");

        let first = start_with(config(&url), Arc::new(MockBackend::new("app-1"))).await;
        assert_eq!(wait_for_user(&first.sdk).await, "player-1");
        first.sdk.shutdown().await;

        // Same app id: the saved user is reused.
        let again = start_with(config(&url), Arc::new(MockBackend::new("app-1"))).await;
        assert_eq!(again.sdk.user_id().await.as_deref(), Some("player-1"));
        again.sdk.shutdown().await;

        // New app id: a new player is created.
        let mut changed = config(&url);
        changed.app_id = "app-2".into();
        let backend = Arc::new(MockBackend::new("app-2").with_player_id("player-2"));
        let third = start_with(changed, backend.clone()).await;
        assert_eq!(wait_for_user(&third.sdk).await, "player-2");
        assert!(backend
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::CreatePlayer(_))));
        third.sdk.shutdown().await;

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_shutdown_stops_gate() {
        let h = start().await;
        h.sdk.shutdown().await;

        assert!(matches!(h.sdk.on_app_focus().await, Err(SessionError::ShutDown)));
    }
}

// ============================================================================
// Inbound and opened notifications
// ============================================================================

mod notification_tests {
    use super::*;

    #[tokio::test]
    async fn test_inbound_displays_persists_and_notifies() {
        let h = start().await;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        h.sdk.set_received_handler(move |event| sink.lock().unwrap().push(event));

        let raw = payload("n-1", "Hello");
        let result = h.sdk.handle_inbound(&raw).await;
        assert!(matches!(result, ProcessResult::Handled { persisted: true, .. }));

        // Exact duplicate is a no-op downstream.
        let duplicate = h.sdk.handle_inbound(&raw).await;
        assert!(matches!(duplicate, ProcessResult::Skipped { .. }));

        h.sdk.flush_callbacks().await.unwrap();
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        // Started in the foreground with in-app alerts enabled.
        assert_eq!(received[0].display_type, DisplayType::InAppAlert);
        assert!(received[0].is_app_in_focus);

        let displayed = h.display.displayed();
        assert_eq!(displayed.len(), 1);
        assert!(displayed[0].2);
        assert_eq!(h.display.last_badge_count(), Some(1));
    }

    #[tokio::test]
    async fn test_foreground_without_display_is_silent() {
        let h = start().await;
        h.sdk.set_in_focus_displaying(InFocusDisplayOption::None).await;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        h.sdk.set_received_handler(move |event| sink.lock().unwrap().push(event));

        let result = h.sdk.handle_inbound(&payload("n-2", "Quiet")).await;
        assert!(matches!(
            result,
            ProcessResult::Handled {
                presentation_id: None,
                ..
            }
        ));

        h.sdk.flush_callbacks().await.unwrap();
        assert!(h.display.displayed().is_empty());
        assert!(!received.lock().unwrap()[0].shown);
    }

    #[tokio::test]
    async fn test_open_reports_and_replays_to_late_handler() {
        let h = start().await;
        wait_for_user(&h.sdk).await;

        let first = payload("n-1", "First");
        let second = payload("n-2", "Second");
        h.sdk.handle_inbound(&first).await;
        h.sdk.handle_inbound(&second).await;

        let opened = json!({
            "alert": "First",
            "custom": {"i": "n-1"},
            "actionSelected": "reply"
        })
        .to_string();
        assert!(h.sdk.handle_notification_open(&[&opened, &second], false).await);

        // No handler yet: the event waits.
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        h.sdk.set_opened_handler(move |event| sink.lock().unwrap().push(event));
        h.sdk.flush_callbacks().await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action.kind, ActionType::ActionTaken);
        assert_eq!(events[0].notification.grouped_notifications.len(), 1);
        assert_eq!(events[0].notification.display_type, DisplayType::Notification);

        let reported: Vec<String> = h
            .backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::NotificationOpened { notification_id, player_id } => {
                    assert_eq!(player_id, "player-1");
                    Some(notification_id)
                }
                _ => None,
            })
            .collect();
        assert_eq!(reported, vec!["n-1".to_string(), "n-2".to_string()]);
        assert_eq!(h.display.last_badge_count(), Some(0));
    }

    #[tokio::test]
    async fn test_opened_event_carries_presentation_id() {
        let h = start().await;
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        h.sdk.set_opened_handler(move |event| sink.lock().unwrap().push(event));

        let mut shown = Vec::new();
        for (id, body) in [("p-1", "Tagged"), ("p-2", "Looked up")] {
            match h.sdk.handle_inbound(&payload(id, body)).await {
                ProcessResult::Handled {
                    presentation_id: Some(presentation_id),
                    ..
                } => shown.push(presentation_id),
                other => panic!("unexpected result: {:?}", other),
            }
        }

        // The platform layer echoes the id back on the opened payload.
        let tagged = json!({
            "alert": "Tagged",
            "custom": {"i": "p-1"},
            "notificationId": shown[0]
        })
        .to_string();
        assert!(h.sdk.handle_notification_open(&[&tagged], false).await);

        // Without it, the id comes from the stored record.
        assert!(h.sdk.handle_notification_open(&[&payload("p-2", "Looked up")], false).await);

        h.sdk.flush_callbacks().await.unwrap();
        let opened: Vec<Option<i32>> = events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.notification.presentation_id)
            .collect();
        assert_eq!(opened, vec![Some(shown[0]), Some(shown[1])]);
    }

    #[tokio::test]
    async fn test_open_with_only_malformed_payloads() {
        let h = start().await;
        assert!(!h.sdk.handle_notification_open(&["not json"], true).await);
    }

    #[tokio::test]
    async fn test_clear_and_cancel() {
        let h = start().await;
        let ids: Vec<i32> = {
            let mut ids = Vec::new();
            for (id, body) in [("a", "A"), ("b", "B"), ("c", "C")] {
                match h.sdk.handle_inbound(&payload(id, body)).await {
                    ProcessResult::Handled {
                        presentation_id: Some(presentation_id),
                        ..
                    } => ids.push(presentation_id),
                    other => panic!("unexpected result: {:?}", other),
                }
            }
            ids
        };

        let badge = h.sdk.cancel_notification(ids[0]).await.unwrap();
        assert_eq!(badge, 2);
        assert_eq!(h.display.cancelled(), vec![ids[0]]);

        let dismissed = h.sdk.clear_notifications().await.unwrap();
        assert_eq!(dismissed, 2);
        assert_eq!(h.display.last_badge_count(), Some(0));
        assert_eq!(h.display.cancelled().len(), 3);
        assert_eq!(h.sdk.store().badge_count().await.unwrap(), 0);
    }
}

// ============================================================================
// Tags
// ============================================================================

mod tag_tests {
    use super::*;

    #[tokio::test]
    async fn test_only_known_deletes_are_sent() {
        let h = start().await;
        wait_for_user(&h.sdk).await;

        h.backend.set_fail_updates(true);
        assert!(h.sdk.send_tags(json!({"a": "1"})).await.is_err());
        h.backend.set_fail_updates(false);

        assert!(h.sdk.send_tags(json!({"a": "", "b": ""})).await.unwrap());

        let last = h.backend.updates().pop().unwrap();
        assert_eq!(last["tags"], json!({"a": ""}));
    }

    #[tokio::test]
    async fn test_tags_merged_view() {
        let h = start().await;
        wait_for_user(&h.sdk).await;

        h.sdk.send_tag("level", 3).await.unwrap();
        h.sdk.send_tags(json!({"name": "ann", "nested": {"x": 1}})).await.unwrap();
        h.sdk.delete_tag("name").await.unwrap();

        assert_eq!(h.sdk.get_tags().await, json!({"level": "3"}).as_object().cloned().unwrap());
        // Setting an unchanged value sends nothing.
        assert!(!h.sdk.send_tag("level", "3").await.unwrap());
    }

    #[tokio::test]
    async fn test_send_tags_requires_object() {
        let h = start().await;
        assert!(matches!(
            h.sdk.send_tags(json!(["a"])).await,
            Err(SessionError::InvalidTags(_))
        ));
    }
}

// ============================================================================
// Backend passthroughs
// ============================================================================

mod backend_tests {
    use super::*;

    #[tokio::test]
    async fn test_post_notification_fills_app_id() {
        let h = start().await;

        h.sdk
            .post_notification(json!({"contents": {"en": "hi"}, "include_player_ids": ["p"]}))
            .await
            .unwrap();
        h.sdk
            .post_notification(json!({"app_id": "other", "include_player_ids": ["p"]}))
            .await
            .unwrap();

        let posted: Vec<_> = h
            .backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::PostNotification(body) => Some(body),
                _ => None,
            })
            .collect();
        assert_eq!(posted[0]["app_id"], "app-1");
        assert_eq!(posted[1]["app_id"], "other");

        let rejected = h.sdk.post_notification(json!({"include_player_ids": []})).await;
        assert!(matches!(rejected, Err(SessionError::Backend(_))));
        assert!(matches!(
            h.sdk.post_notification(json!("text")).await,
            Err(SessionError::InvalidNotification(_))
        ));
    }

    #[tokio::test]
    async fn test_purchases_need_user() {
        let backend = Arc::new(MockBackend::new("app-1").with_player_delay(Duration::from_millis(200)));
        let h = start_with(config("sqlite::memory:"), backend).await;

        assert!(!h.sdk.send_purchases(json!([{"sku": "gem"}]), false).await.unwrap());

        wait_for_user(&h.sdk).await;
        assert!(h.sdk.send_purchases(json!([{"sku": "gem"}]), true).await.unwrap());
        assert!(h.backend.calls().iter().any(|call| matches!(
            call,
            BackendCall::OnPurchase { existing: true, .. }
        )));
    }

    #[tokio::test]
    async fn test_unsubscribe_updates_notification_types() {
        let h = start().await;
        wait_for_user(&h.sdk).await;

        assert!(h.sdk.set_subscription(false).await.unwrap());
        let last = h.backend.updates().pop().unwrap();
        assert_eq!(last["notification_types"], -2);

        assert!(h.sdk.set_subscription(true).await.unwrap());
        let last = h.backend.updates().pop().unwrap();
        assert_eq!(last["notification_types"], 1);
    }

    #[tokio::test]
    async fn test_prompt_location_reports_fix() {
        let h = start().await;
        wait_for_user(&h.sdk).await;

        let location = h.sdk.prompt_location().await.unwrap().unwrap();
        assert_eq!(location.lat, 52.5);

        let last = h.backend.updates().pop().unwrap();
        assert_eq!(last["lat"], 52.5);
        assert_eq!(last["long"], 13.4);
    }
}

// ============================================================================
// Focus
// ============================================================================

mod focus_tests {
    use super::*;

    #[tokio::test]
    async fn test_short_focus_is_saved_not_sent() {
        let h = start().await;
        wait_for_user(&h.sdk).await;

        let report = h.sdk.on_app_lost_focus(false).await;
        assert!(matches!(report, FocusReport::Saved { .. }));
        assert!(!h
            .backend
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::OnFocus { .. })));
    }

    #[tokio::test]
    async fn test_refocus_within_threshold_is_same_session() {
        let h = start().await;
        wait_for_user(&h.sdk).await;

        h.sdk.on_app_lost_focus(false).await;
        assert!(!h.sdk.on_app_focus().await.unwrap());

        // The same-session cycle updates rather than starting a session.
        for _ in 0..300 {
            if h.backend.updates().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.backend.updates().len(), 1);
    }
}
