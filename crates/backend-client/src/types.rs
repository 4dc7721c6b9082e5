//! Request and response bodies for the backend REST surface.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Remote configuration returned by `apps/{app_id}/android_params.js`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteParams {
    /// Sender id to register the push token under, if the backend supplies one.
    #[serde(default)]
    pub android_sender_id: Option<String>,
    /// Package fingerprints of apps to report as installed.
    #[serde(default)]
    pub awl_list: Map<String, Value>,
}

/// Response from player creation and session calls.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlayerResponse {
    #[serde(default)]
    pub success: Option<bool>,
    /// Player id assigned (or reassigned) by the backend.
    #[serde(default)]
    pub id: Option<String>,
}

/// Body of `PUT players/{id}/on_focus`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnFocusBody<'a> {
    pub app_id: &'a str,
    #[serde(rename = "type")]
    pub kind: i32,
    pub state: &'static str,
    pub active_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_type: Option<i32>,
}

/// Body of `PUT notifications/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenedBody<'a> {
    pub app_id: &'a str,
    pub player_id: &'a str,
    pub opened: bool,
}

/// Body of `POST players/{id}/on_purchase`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseBody<'a> {
    pub app_id: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub existing: bool,
    pub purchases: &'a Value,
}
