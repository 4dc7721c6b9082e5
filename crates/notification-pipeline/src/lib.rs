//! Inbound notification pipeline.
//!
//! Payloads flow through parse → dedupe → display → persist → callback:
//!
//! - [`Deduplicator`] answers whether a stable id was already processed
//! - [`BundleProcessor`] runs the pipeline for one payload
//! - [`should_display`] routes between display and the silent path
//! - [`CallbackDispatcher`] invokes developer handlers on one affinity loop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use notification_pipeline::{BundleProcessor, CallbackDispatcher, InboundContext};
//! use notification_store::NotificationStore;
//! # use push_core::{async_trait, NotificationDisplay, PresentationNotification};
//! # struct Ui;
//! # #[async_trait]
//! # impl NotificationDisplay for Ui {
//! #     async fn display(&self, _: i32, _: &PresentationNotification, _: bool) {}
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = NotificationStore::connect("sqlite:push.db?mode=rwc").await?;
//! store.migrate().await?;
//!
//! let (dispatcher, _loop) = CallbackDispatcher::spawn();
//! dispatcher.set_received_handler(|event| println!("received: {:?}", event.payload.body));
//!
//! let processor = BundleProcessor::new(store, Arc::new(Ui), dispatcher);
//! let raw = r#"{"alert":"Hello","custom":{"i":"abc"}}"#;
//! let result = processor.process_inbound(raw, InboundContext::default()).await;
//! println!("{:?}", result);
//! # Ok(())
//! # }
//! ```

pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod processor;
pub mod routing;

pub use dedup::Deduplicator;
pub use dispatcher::{AffinityLoop, CallbackDispatcher, OpenedHandler, ReceivedHandler};
pub use error::PipelineError;
pub use processor::{
    opened_result, BundleProcessor, HandleOptions, InboundContext, ProcessResult, SharedDisplay,
};
pub use routing::should_display;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
