//! User state reported to the backend.

use push_core::{package_fingerprint, DeviceInfo, Location};
use serde_json::{json, Map, Value};

/// `notification_types` reported when the user turned notifications off.
pub const UNSUBSCRIBED: i32 = -2;

/// Setting keys in the store's `settings` table.
pub(crate) mod keys {
    pub const APP_ID: &str = "app_id";
    pub const PLAYER_ID: &str = "player_id";
    pub const PUSH_TOKEN: &str = "push_token";
    pub const SENDER_ID: &str = "sender_id";
    pub const LAST_SESSION_MS: &str = "last_session_ms";
    pub const UNSENT_ACTIVE_SECS: &str = "unsent_active_secs";
    pub const CONFIRMED_TAGS: &str = "confirmed_tags";
    pub const SUBSCRIPTION_ENABLED: &str = "subscription_enabled";
}

/// Snapshot of everything reported in a player sync.
#[derive(Debug, Clone, PartialEq)]
pub struct UserState {
    pub app_id: String,
    pub device: DeviceInfo,
    pub push_token: Option<String>,
    /// `1` when push registration works, negative error codes otherwise.
    pub subscribable_status: i32,
    /// The user's own subscription preference.
    pub subscription_enabled: bool,
    pub location: Option<Location>,
    /// Fingerprints of installed packages on the remote allow-list.
    pub packages: Vec<String>,
    /// Pending tag delta, sent with the state when non-empty.
    pub tags: Map<String, Value>,
}

impl UserState {
    pub fn new(app_id: impl Into<String>, device: DeviceInfo) -> Self {
        Self {
            app_id: app_id.into(),
            device,
            push_token: None,
            subscribable_status: 1,
            subscription_enabled: true,
            location: None,
            packages: Vec::new(),
            tags: Map::new(),
        }
    }

    /// The `notification_types` value: hard registration errors win, then
    /// the user's opt-out, then subscribed.
    pub fn notification_types(&self) -> i32 {
        notification_types(self.subscribable_status, self.subscription_enabled)
    }

    /// Body for `POST players`, `PUT players/{id}` and `on_session`.
    pub fn to_player_body(&self) -> Value {
        let device = &self.device;
        let mut body = json!({
            "app_id": self.app_id,
            "device_type": device.device_type,
            "device_os": device.device_os,
            "device_model": device.device_model,
            "timezone": device.timezone_offset,
            "language": device.language,
            "sdk": env!("CARGO_PKG_VERSION"),
            "sdk_type": "native",
            "android_package": device.package_name,
            "rooted": device.rooted,
            "notification_types": self.notification_types(),
        });

        let Some(fields) = body.as_object_mut() else {
            return body;
        };

        if let Some(token) = &self.push_token {
            fields.insert("identifier".into(), json!(token));
        }
        if let Some(ad_id) = &device.ad_id {
            fields.insert("ad_id".into(), json!(ad_id));
        }
        if let Some(version) = device.app_version {
            fields.insert("game_version".into(), json!(version));
        }
        if let Some(net_type) = device.net_type {
            fields.insert("net_type".into(), json!(net_type));
        }
        if let Some(carrier) = &device.carrier {
            fields.insert("carrier".into(), json!(carrier));
        }
        if let Some(location) = &self.location {
            fields.insert("lat".into(), json!(location.lat));
            fields.insert("long".into(), json!(location.long));
            if let Some(accuracy) = location.accuracy {
                fields.insert("loc_acc".into(), json!(accuracy));
            }
            if let Some(kind) = location.kind {
                fields.insert("loc_type".into(), json!(kind));
            }
        }
        if !self.packages.is_empty() {
            fields.insert("pkgs".into(), json!(self.packages));
        }
        if !self.tags.is_empty() {
            fields.insert("tags".into(), Value::Object(self.tags.clone()));
        }

        body
    }
}

/// `notification_types` for a registration status and subscription preference.
pub fn notification_types(subscribable_status: i32, subscription_enabled: bool) -> i32 {
    if subscribable_status < UNSUBSCRIBED {
        subscribable_status
    } else if !subscription_enabled {
        UNSUBSCRIBED
    } else {
        1
    }
}

/// Fingerprints of `installed` packages that appear in the allow-list.
pub fn allowed_packages(installed: &[String], allow_list: &Map<String, Value>) -> Vec<String> {
    installed
        .iter()
        .map(|name| package_fingerprint(name))
        .filter(|fingerprint| allow_list.contains_key(fingerprint))
        .collect()
}

/// Combine a new registration status with the current one.
///
/// Errors (`incoming < 1`) are recorded only while no token was ever
/// obtained, and only over a healthy (`1`) or hard-error (`< -6`) status.
/// A success only replaces a hard error.
pub fn merge_subscribable_status(current: i32, incoming: i32, has_token: bool) -> i32 {
    if incoming < 1 {
        if !has_token && (current == 1 || current < -6) {
            incoming
        } else {
            current
        }
    } else if current < -6 {
        incoming
    } else {
        current
    }
}
