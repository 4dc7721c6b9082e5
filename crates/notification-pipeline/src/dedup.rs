//! Duplicate detection against the notification store.

use notification_store::NotificationStore;

use crate::error::PipelineError;

/// Answers whether a stable id has already been processed.
///
/// Any retained record counts, whatever its opened/dismissed flags. Two
/// payloads racing past this check are resolved by the store's unique
/// constraint at insert time.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    store: NotificationStore,
}

impl Deduplicator {
    pub fn new(store: NotificationStore) -> Self {
        Self { store }
    }

    /// Whether a record with `stable_id` exists. An empty id is never a duplicate.
    pub async fn is_duplicate(&self, stable_id: &str) -> Result<bool, PipelineError> {
        if stable_id.is_empty() {
            return Ok(false);
        }
        Ok(self.store.is_known(stable_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notification_store::NewNotification;

    async fn test_store() -> NotificationStore {
        let store = NotificationStore::connect_with_pool_size("sqlite::memory:", 1)
            .await
            .unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_duplicate_after_insert() {
        let store = test_store().await;
        let dedup = Deduplicator::new(store.clone());

        assert!(!dedup.is_duplicate("abc").await.unwrap());

        store
            .persist(&NewNotification {
                stable_id: "abc".to_string(),
                group_id: None,
                opened: true,
                presentation_id: None,
                title: None,
                body: String::new(),
                raw_payload: "{}".to_string(),
            })
            .await
            .unwrap();

        assert!(dedup.is_duplicate("abc").await.unwrap());
        assert!(!dedup.is_duplicate("").await.unwrap());
    }
}
