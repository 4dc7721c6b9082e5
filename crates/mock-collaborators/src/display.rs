//! Recording notification display.

use std::sync::Mutex;

use async_trait::async_trait;
use push_core::{NotificationDisplay, PresentationNotification};

/// Records every display, cancel, and badge update.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    displayed: Mutex<Vec<(i32, PresentationNotification, bool)>>,
    cancelled: Mutex<Vec<i32>>,
    badge_counts: Mutex<Vec<i64>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(presentation_id, notification, as_alert)` for each display, in order.
    pub fn displayed(&self) -> Vec<(i32, PresentationNotification, bool)> {
        self.displayed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Cancelled presentation ids, in order.
    pub fn cancelled(&self) -> Vec<i32> {
        self.cancelled.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Badge counts set, in order.
    pub fn badge_counts(&self) -> Vec<i64> {
        self.badge_counts.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// The most recent badge count, if any was set.
    pub fn last_badge_count(&self) -> Option<i64> {
        self.badge_counts().last().copied()
    }
}

#[async_trait]
impl NotificationDisplay for RecordingDisplay {
    async fn display(&self, presentation_id: i32, notification: &PresentationNotification, as_alert: bool) {
        if let Ok(mut displayed) = self.displayed.lock() {
            displayed.push((presentation_id, notification.clone(), as_alert));
        }
    }

    async fn cancel(&self, presentation_id: i32) {
        if let Ok(mut cancelled) = self.cancelled.lock() {
            cancelled.push(presentation_id);
        }
    }

    async fn set_badge_count(&self, count: i64) {
        if let Ok(mut counts) = self.badge_counts.lock() {
            counts.push(count);
        }
    }
}
