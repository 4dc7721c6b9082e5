//! Push session example.
//!
//! Starts the SDK with mock platform collaborators, feeds it a couple of
//! payloads, opens one, and sends tags.
//!
//! Run with: cargo run -p session --example push_session
//!
//! Configuration via .env file or environment variables:
//!   PUSH_APP_ID        - Application id (default: demo-app)
//!   PUSH_API_URL       - Backend base URL; when unset an in-memory backend is used
//!   PUSH_DATABASE_URL  - Store location (default: in-memory)
//!   RUST_LOG           - Log filter

use std::env;
use std::sync::Arc;
use std::time::Duration;

use backend_client::{BackendClient, BackendConfig};
use mock_collaborators::{MockBackend, MockLocation, MockRegistrar, RecordingDisplay};
use serde_json::json;
use session::{Collaborators, PushSdk, SdkConfig, SharedBackend};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("session=debug".parse()?)
                .add_directive("notification_pipeline=debug".parse()?)
                .add_directive("notification_store=info".parse()?),
        )
        .init();

    let app_id = env::var("PUSH_APP_ID").unwrap_or_else(|_| "demo-app".to_string());
    let backend_config = BackendConfig::from_env();

    let backend: SharedBackend = if env::var("PUSH_API_URL").is_ok() {
        info!("Using backend at {}", backend_config.base_url);
        let mut config = backend_config.clone();
        config.app_id = app_id.clone();
        Arc::new(BackendClient::new(config)?)
    } else {
        info!("PUSH_API_URL not set; using in-memory backend");
        Arc::new(MockBackend::new(app_id.clone()))
    };

    let database_url = env::var("PUSH_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    let config = SdkConfig::new(app_id, backend_config)
        .with_database_url(database_url)
        .with_location(true, true);

    let display = Arc::new(RecordingDisplay::new());
    let sdk = PushSdk::init(
        config,
        Collaborators {
            registrar: Arc::new(MockRegistrar::succeeding("demo-token")),
            location: Arc::new(MockLocation::at(52.52, 13.40)),
            display: display.clone(),
            backend,
        },
    )
    .await?;

    sdk.set_received_handler(|event| {
        info!(
            title = ?event.payload.title,
            shown = event.shown,
            "Notification received"
        );
    });
    sdk.set_opened_handler(|opened| {
        info!(action = ?opened.action.kind, "Notification opened");
    });

    // Give the first readiness cycle a moment to register the player.
    for _ in 0..50 {
        if sdk.user_id().await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!(user_id = ?sdk.user_id().await, "Readiness cycle finished");

    let welcome = json!({"alert": "Welcome!", "title": "Hello", "custom": {"i": "demo-1"}}).to_string();
    let silent = json!({"custom": {"i": "demo-2", "a": {"sync": true}}}).to_string();

    info!(result = ?sdk.handle_inbound(&welcome).await, "Inbound processed");
    info!(result = ?sdk.handle_inbound(&welcome).await, "Duplicate processed");
    info!(result = ?sdk.handle_inbound(&silent).await, "Silent payload processed");

    sdk.handle_notification_open(&[&welcome], false).await;

    sdk.send_tags(json!({"plan": "free", "level": 1})).await?;
    info!(tags = ?sdk.get_tags().await, "Tags");

    sdk.flush_callbacks().await?;
    let displayed_count = display.displayed().len();
    let last_badge = display.last_badge_count();
    info!(displayed = displayed_count, badge = ?last_badge, "Display state");

    sdk.on_app_lost_focus(false).await;
    sdk.shutdown().await;
    Ok(())
}
