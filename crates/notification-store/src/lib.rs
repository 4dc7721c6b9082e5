//! SQLite persistence for received notifications.
//!
//! Records are keyed by the payload's stable id. Every write that changes the
//! set of showing notifications runs in a single transaction and returns the
//! recomputed badge count, so callers never observe a half-applied prune.
//!
//! # Example
//!
//! ```no_run
//! use notification_store::{NewNotification, NotificationStore, PersistOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = NotificationStore::connect("sqlite:push.db?mode=rwc").await?;
//!     store.migrate().await?;
//!
//!     let outcome = store
//!         .persist(&NewNotification {
//!             stable_id: "a1b2".to_string(),
//!             group_id: None,
//!             opened: false,
//!             presentation_id: Some(42),
//!             title: Some("Hello".to_string()),
//!             body: "World".to_string(),
//!             raw_payload: "{}".to_string(),
//!         })
//!         .await?;
//!
//!     if let PersistOutcome::Inserted { badge_count, .. } = outcome {
//!         println!("badge: {badge_count}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod models;
pub mod notification;
pub mod settings;

pub use error::{Result, StoreError};
pub use models::{NewNotification, NotificationRecord, PersistOutcome};

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Records older than this are pruned on every insert (4 weeks).
pub const RETENTION: Duration = Duration::from_secs(2_419_200);

/// Only records younger than this are re-displayed by a restore (1 week).
pub const RESTORE_WINDOW: Duration = Duration::from_secs(604_800);

/// Upper bound on records re-displayed by a single restore.
pub const RESTORE_LIMIT: i64 = 49;

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Notification store backed by a SQLite pool.
///
/// Clones share the pool and the writer lock.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl NotificationStore {
    /// Default pool size for database connections.
    const DEFAULT_POOL_SIZE: u32 = 5;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    ///
    /// In-memory databases are per connection, so tests use a pool size of 1.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        info!("Connected to notification store: {} (pool size: {})", url, pool_size);

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running notification store migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Whether a record with this stable id exists.
    pub async fn is_known(&self, stable_id: &str) -> Result<bool> {
        Ok(notification::find_by_stable_id(&self.pool, stable_id)
            .await?
            .is_some())
    }

    /// Get a record by stable id.
    pub async fn get(&self, stable_id: &str) -> Result<Option<NotificationRecord>> {
        notification::find_by_stable_id(&self.pool, stable_id).await
    }

    /// Prune, insert and recount using the current time.
    pub async fn persist(&self, record: &NewNotification) -> Result<PersistOutcome> {
        self.persist_at(record, now_unix()).await
    }

    /// Prune expired records, insert `record` and recount the badge in one
    /// transaction.
    ///
    /// A duplicate stable id rolls the whole transaction back, including the
    /// prune.
    pub async fn persist_at(&self, record: &NewNotification, now: i64) -> Result<PersistOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let cutoff = now - RETENTION.as_secs() as i64;
        let pruned = notification::delete_created_before(&mut *tx, cutoff).await?;

        match notification::insert(&mut *tx, record, now).await {
            Ok(_) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                tx.rollback().await?;
                debug!("Notification {} already stored", record.stable_id);
                return Ok(PersistOutcome::AlreadyExists);
            }
            Err(e) => return Err(e),
        }

        let badge_count = notification::count_unopened_undismissed(&mut *tx).await?;
        tx.commit().await?;

        debug!(
            "Stored notification {} (pruned {}, badge {})",
            record.stable_id, pruned, badge_count
        );
        Ok(PersistOutcome::Inserted { pruned, badge_count })
    }

    /// Mark records as opened and return the new badge count.
    ///
    /// Unknown ids are skipped.
    pub async fn mark_opened(&self, stable_ids: &[String]) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        for stable_id in stable_ids {
            match notification::update_flags(&mut *tx, stable_id, Some(true), None).await {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let badge_count = notification::count_unopened_undismissed(&mut *tx).await?;
        tx.commit().await?;
        Ok(badge_count)
    }

    /// Dismiss every unopened record. Returns the number dismissed.
    pub async fn dismiss_all(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        notification::dismiss_all_unopened(&self.pool).await
    }

    /// Dismiss the record shown under `presentation_id` and return the new
    /// badge count.
    pub async fn dismiss_presentation(&self, presentation_id: i32) -> Result<i64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        notification::dismiss_by_presentation_id(&mut *tx, presentation_id).await?;
        let badge_count = notification::count_unopened_undismissed(&mut *tx).await?;

        tx.commit().await?;
        Ok(badge_count)
    }

    /// Current badge count.
    pub async fn badge_count(&self) -> Result<i64> {
        notification::count_unopened_undismissed(&self.pool).await
    }

    /// Records to re-display after a restart.
    pub async fn restorable(&self, now: i64) -> Result<Vec<NotificationRecord>> {
        let since = now - RESTORE_WINDOW.as_secs() as i64;
        notification::list_restorable(&self.pool, since, RESTORE_LIMIT).await
    }

    /// Presentation ids of notifications still showing.
    pub async fn active_presentation_ids(&self) -> Result<Vec<i32>> {
        notification::active_presentation_ids(&self.pool).await
    }

    /// Read a setting.
    pub async fn setting(&self, key: &str) -> Result<Option<String>> {
        settings::get_setting(&self.pool, key).await
    }

    /// Write a setting.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        settings::upsert_setting(&self.pool, key, value).await
    }

    /// Remove a setting.
    pub async fn remove_setting(&self, key: &str) -> Result<()> {
        settings::clear_setting(&self.pool, key).await
    }
}
