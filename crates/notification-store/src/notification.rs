//! Notification record queries.
//!
//! Every function takes any SQLite executor so it can run against the pool
//! or inside a transaction.

use sqlx::SqliteExecutor;

use crate::error::{Result, StoreError};
use crate::models::{NewNotification, NotificationRecord};

/// Insert a notification record.
///
/// A second record with the same stable id is rejected with
/// [`StoreError::AlreadyExists`].
pub async fn insert<'e, E>(executor: E, record: &NewNotification, created_at: i64) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO notifications
            (stable_id, group_id, opened, dismissed, presentation_id, title, body, raw_payload, created_at)
        VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.stable_id)
    .bind(&record.group_id)
    .bind(record.opened)
    .bind(record.presentation_id)
    .bind(&record.title)
    .bind(&record.body)
    .bind(&record.raw_payload)
    .bind(created_at)
    .execute(executor)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return StoreError::AlreadyExists {
                    entity: "Notification",
                    id: record.stable_id.clone(),
                };
            }
        }
        StoreError::Sqlx(e)
    })?;

    Ok(result.last_insert_rowid())
}

/// Get a notification by stable id.
pub async fn find_by_stable_id<'e, E>(executor: E, stable_id: &str) -> Result<Option<NotificationRecord>>
where
    E: SqliteExecutor<'e>,
{
    let record = sqlx::query_as::<_, NotificationRecord>(
        r#"
        SELECT id, stable_id, group_id, opened, dismissed, presentation_id, title, body, raw_payload, created_at
        FROM notifications
        WHERE stable_id = ?
        "#,
    )
    .bind(stable_id)
    .fetch_optional(executor)
    .await?;

    Ok(record)
}

/// Delete every record created strictly before `cutoff` (unix seconds).
pub async fn delete_created_before<'e, E>(executor: E, cutoff: i64) -> Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        DELETE FROM notifications
        WHERE created_at < ?
        "#,
    )
    .bind(cutoff)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Count records that are neither opened nor dismissed.
pub async fn count_unopened_undismissed<'e, E>(executor: E) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM notifications
        WHERE opened = 0 AND dismissed = 0
        "#,
    )
    .fetch_one(executor)
    .await?;

    Ok(count)
}

/// Update the opened and/or dismissed flags of a record.
///
/// `None` leaves the flag unchanged.
pub async fn update_flags<'e, E>(
    executor: E,
    stable_id: &str,
    opened: Option<bool>,
    dismissed: Option<bool>,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET opened = COALESCE(?, opened),
            dismissed = COALESCE(?, dismissed)
        WHERE stable_id = ?
        "#,
    )
    .bind(opened)
    .bind(dismissed)
    .bind(stable_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Notification",
            id: stable_id.to_string(),
        });
    }

    Ok(())
}

/// Mark every unopened record as dismissed.
pub async fn dismiss_all_unopened<'e, E>(executor: E) -> Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET dismissed = 1
        WHERE opened = 0
        "#,
    )
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Mark the unopened record shown under `presentation_id` as dismissed.
pub async fn dismiss_by_presentation_id<'e, E>(executor: E, presentation_id: i32) -> Result<u64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET dismissed = 1
        WHERE opened = 0 AND presentation_id = ?
        "#,
    )
    .bind(presentation_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Presentation ids of records still showing (unopened, undismissed).
pub async fn active_presentation_ids<'e, E>(executor: E) -> Result<Vec<i32>>
where
    E: SqliteExecutor<'e>,
{
    let ids = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT presentation_id
        FROM notifications
        WHERE opened = 0 AND dismissed = 0 AND presentation_id IS NOT NULL
        ORDER BY id
        "#,
    )
    .fetch_all(executor)
    .await?;

    Ok(ids)
}

/// Records that should be re-displayed after a restart, oldest first.
pub async fn list_restorable<'e, E>(
    executor: E,
    created_since: i64,
    limit: i64,
) -> Result<Vec<NotificationRecord>>
where
    E: SqliteExecutor<'e>,
{
    let records = sqlx::query_as::<_, NotificationRecord>(
        r#"
        SELECT id, stable_id, group_id, opened, dismissed, presentation_id, title, body, raw_payload, created_at
        FROM notifications
        WHERE opened = 0
          AND dismissed = 0
          AND presentation_id IS NOT NULL
          AND created_at >= ?
        ORDER BY created_at, id
        LIMIT ?
        "#,
    )
    .bind(created_since)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(records)
}
