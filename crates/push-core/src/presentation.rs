//! Display model derived from an inbound payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::payload::{InboundPayload, DO_NOT_COLLAPSE};

/// A button shown on the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Background image styling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundImageLayout {
    pub image: Option<String>,
    pub title_text_color: Option<String>,
    pub body_text_color: Option<String>,
}

/// Read-only view of a notification handed to the display collaborator and
/// to developer handlers.
///
/// It is owned by the pipeline call that created it and is never persisted;
/// `raw_payload` is the durable form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresentationNotification {
    pub notification_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub small_icon: Option<String>,
    pub large_icon: Option<String>,
    pub big_picture: Option<String>,
    pub sound: Option<String>,
    pub group_key: Option<String>,
    pub group_message: Option<String>,
    pub small_icon_accent_color: Option<String>,
    pub led_color: Option<String>,
    pub lock_screen_visibility: Option<i32>,
    pub from_project_number: Option<String>,
    pub priority: i32,
    pub collapse_id: Option<String>,
    pub launch_url: Option<String>,
    pub additional_data: Option<Map<String, Value>>,
    pub action_buttons: Vec<ActionButton>,
    pub background_image_layout: Option<BackgroundImageLayout>,
    pub raw_payload: String,
}

impl PresentationNotification {
    /// Build the display model from a decoded payload.
    ///
    /// `actionButtons` and `actionSelected` are lifted out of the additional
    /// data; buttons that fail to decode are skipped.
    pub fn from_payload(payload: &InboundPayload) -> Self {
        let custom = payload.custom.clone().unwrap_or_default();
        let mut additional_data = custom.additional_data;
        let mut action_buttons = Vec::new();

        if let Some(data) = additional_data.as_mut() {
            if let Some(buttons) = data.remove("actionButtons") {
                action_buttons = decode_buttons(buttons);
                data.remove("actionSelected");
            }
        }

        let collapse_id = payload
            .collapse_key
            .clone()
            .filter(|key| key != DO_NOT_COLLAPSE);

        let background_image_layout =
            payload
                .bg_img
                .as_ref()
                .map(|image| BackgroundImageLayout {
                    image: image.img.clone(),
                    title_text_color: image.tc.clone(),
                    body_text_color: image.bc.clone(),
                });

        Self {
            notification_id: custom.notification_id,
            title: payload.title.clone(),
            body: payload.alert.clone(),
            small_icon: payload.sicon.clone(),
            large_icon: payload.licon.clone(),
            big_picture: payload.bicon.clone(),
            sound: payload.sound.clone(),
            group_key: payload.grp.clone(),
            group_message: payload.grp_msg.clone(),
            small_icon_accent_color: payload.bgac.clone(),
            led_color: payload.ledc.clone(),
            lock_screen_visibility: payload.vis,
            from_project_number: payload.from.clone(),
            priority: payload.pri.unwrap_or(0),
            collapse_id,
            launch_url: custom.launch_url,
            additional_data,
            action_buttons,
            background_image_layout,
            raw_payload: payload.to_json_string(),
        }
    }
}

fn decode_buttons(value: Value) -> Vec<ActionButton> {
    let Value::Array(items) = value else {
        warn!("actionButtons is not an array, ignoring");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ActionButton>(item) {
            Ok(button) => Some(button),
            Err(e) => {
                warn!("Skipping malformed action button: {}", e);
                None
            }
        })
        .collect()
}
