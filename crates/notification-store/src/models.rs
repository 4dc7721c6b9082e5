//! Store models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NotificationRecord {
    /// Auto-incrementing row id.
    pub id: i64,
    /// Stable id from the payload's `custom.i` field (unique).
    pub stable_id: String,
    /// Group key, if the notification belongs to a group.
    pub group_id: Option<String>,
    pub opened: bool,
    pub dismissed: bool,
    /// Platform presentation id; absent for notifications that were never displayed.
    pub presentation_id: Option<i32>,
    pub title: Option<String>,
    pub body: String,
    /// Full payload JSON (after short-key expansion).
    pub raw_payload: String,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

/// Fields for inserting a new notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub stable_id: String,
    pub group_id: Option<String>,
    pub opened: bool,
    pub presentation_id: Option<i32>,
    pub title: Option<String>,
    pub body: String,
    pub raw_payload: String,
}

/// Result of the prune/insert/recount transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The record was inserted.
    Inserted {
        /// Expired records removed before the insert.
        pruned: u64,
        /// Unopened, undismissed records after the insert.
        badge_count: i64,
    },
    /// A record with the same stable id already exists; nothing changed.
    AlreadyExists,
}
