//! Pushes user state and tag deltas to the backend.

use std::sync::Arc;

use backend_client::{BackendError, PushBackend};
use notification_store::NotificationStore;
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::error::SessionError;
use crate::focus::{now_ms, FocusTracker};
use crate::state::{keys, UserState};
use crate::tags::TagState;

/// Shared handle to the backend.
pub type SharedBackend = Arc<dyn PushBackend>;

/// Sends user state to the backend and owns the resulting identity.
///
/// Cloning is cheap; all clones share the same identity, tags, and session
/// clock.
#[derive(Clone)]
pub struct StateSynchronizer {
    backend: SharedBackend,
    store: NotificationStore,
    identity: Arc<RwLock<Option<String>>>,
    tags: Arc<Mutex<TagState>>,
    focus: Arc<Mutex<FocusTracker>>,
}

impl StateSynchronizer {
    pub fn new(
        backend: SharedBackend,
        store: NotificationStore,
        user_id: Option<String>,
        tags: TagState,
        focus: Arc<Mutex<FocusTracker>>,
    ) -> Self {
        Self {
            backend,
            store,
            identity: Arc::new(RwLock::new(user_id)),
            tags: Arc::new(Mutex::new(tags)),
            focus,
        }
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// The backend player id, once one was assigned.
    pub async fn user_id(&self) -> Option<String> {
        self.identity.read().await.clone()
    }

    /// Sync `user_state` on a background task.
    ///
    /// Failures are logged; the next readiness cycle retries.
    pub fn flush(&self, user_state: UserState, as_new_session: bool) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(
            async move {
                if let Err(e) = this.sync(user_state, as_new_session).await {
                    warn!("State sync failed: {}", e);
                }
            }
            .instrument(tracing::info_span!("state_sync", new_session = as_new_session)),
        )
    }

    /// Sync `user_state` now and return the player id.
    ///
    /// Creates the player when no id is known. Otherwise a new session goes
    /// to `on_session` and anything else to `PUT players/{id}`.
    pub async fn sync(&self, mut user_state: UserState, as_new_session: bool) -> Result<String, SessionError> {
        let delta = self.tags.lock().await.delta();
        user_state.tags = delta.clone();
        let body = user_state.to_player_body();

        let player_id = match self.user_id().await {
            None => {
                debug!("Creating player");
                let response = self.backend.create_player(&body).await?;
                response.id.ok_or(BackendError::MissingField("id"))?
            }
            Some(id) if as_new_session => {
                debug!(player_id = %id, "Reporting new session");
                let response = self.backend.on_session(&id, &body).await?;
                response.id.unwrap_or(id)
            }
            Some(id) => {
                debug!(player_id = %id, "Updating player");
                self.backend.update_player(&id, &body).await?;
                id
            }
        };

        *self.identity.write().await = Some(player_id.clone());
        self.store.set_setting(keys::PLAYER_ID, &player_id).await?;

        if let Some(token) = &user_state.push_token {
            self.store.set_setting(keys::PUSH_TOKEN, token).await?;
        }

        let now = now_ms();
        self.focus.lock().await.record_session(now);
        self.store.set_setting(keys::LAST_SESSION_MS, &now.to_string()).await?;

        if !delta.is_empty() {
            self.confirm_tags(&delta).await?;
        }

        info!(player_id = %player_id, new_session = as_new_session, "User state synced");
        Ok(player_id)
    }

    /// Stage tag changes. Returns the number of keys that changed.
    pub async fn stage_tags(&self, tags: &Map<String, Value>) -> usize {
        self.tags.lock().await.stage(tags)
    }

    /// Confirmed tags with pending changes applied.
    pub async fn tags(&self) -> Map<String, Value> {
        self.tags.lock().await.merged()
    }

    /// Send the pending tag delta, if a user id exists.
    ///
    /// Returns whether anything was sent. On failure the delta stays pending.
    pub async fn flush_tags(&self) -> Result<bool, SessionError> {
        let Some(player_id) = self.user_id().await else {
            debug!("Tags held until a user id is assigned");
            return Ok(false);
        };

        let delta = self.tags.lock().await.delta();
        if delta.is_empty() {
            return Ok(false);
        }

        let body = json!({ "app_id": self.backend.app_id(), "tags": delta });
        self.backend.update_player(&player_id, &body).await?;
        self.confirm_tags(&delta).await?;

        debug!(player_id = %player_id, count = delta.len(), "Tags sent");
        Ok(true)
    }

    /// `PUT players/{id}` with arbitrary fields.
    ///
    /// Returns `false` without sending when no user id exists yet.
    pub async fn update_fields(&self, fields: Value) -> Result<bool, SessionError> {
        let Some(player_id) = self.user_id().await else {
            return Ok(false);
        };

        let mut body = json!({ "app_id": self.backend.app_id() });
        if let (Some(body), Value::Object(fields)) = (body.as_object_mut(), fields) {
            body.extend(fields);
        }

        self.backend.update_player(&player_id, &body).await?;
        Ok(true)
    }

    /// Forget the current user (app id changed).
    pub async fn reset_user(&self) -> Result<(), SessionError> {
        *self.identity.write().await = None;
        self.tags.lock().await.clear();
        self.store.remove_setting(keys::PLAYER_ID).await?;
        self.store.remove_setting(keys::PUSH_TOKEN).await?;
        self.store.remove_setting(keys::CONFIRMED_TAGS).await?;
        Ok(())
    }

    async fn confirm_tags(&self, sent: &Map<String, Value>) -> Result<(), SessionError> {
        let confirmed = {
            let mut tags = self.tags.lock().await;
            tags.confirm(sent);
            serde_json::to_string(tags.confirmed())?
        };
        self.store.set_setting(keys::CONFIRMED_TAGS, &confirmed).await?;
        Ok(())
    }
}
