//! Typed schema for inbound push payloads.
//!
//! The push transport delivers a flat map of strings. Nested structures
//! (`custom`, `bg_img`, `o`) arrive as JSON encoded inside a string, or as a
//! plain object when the payload was re-serialized by the SDK itself. Both
//! forms decode to the same typed fields here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::PayloadError;
use crate::presentation::ActionButton;

/// Action id reported when the notification body (not a button) was tapped.
pub const DEFAULT_ACTION: &str = "__DEFAULT__";

/// Collapse key sentinel meaning "no collapse key".
pub const DO_NOT_COLLAPSE: &str = "do_not_collapse";

/// The `custom` block carried by every payload this SDK produced.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CustomData {
    /// Stable notification id.
    #[serde(default, rename = "i")]
    pub notification_id: Option<String>,
    /// Launch URL.
    #[serde(default, rename = "u")]
    pub launch_url: Option<String>,
    /// Developer additional data.
    #[serde(default, rename = "a")]
    pub additional_data: Option<Map<String, Value>>,
}

/// The `bg_img` block.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BackgroundImage {
    #[serde(default)]
    pub img: Option<String>,
    #[serde(default)]
    pub tc: Option<String>,
    #[serde(default)]
    pub bc: Option<String>,
}

/// Short-key button as sent over the transport (`n`, `i`, `p`).
#[derive(Debug, Deserialize)]
struct ShortKeyButton {
    #[serde(rename = "n")]
    text: String,
    #[serde(default, rename = "i")]
    id: Option<String>,
    #[serde(default, rename = "p")]
    icon: Option<String>,
}

impl ShortKeyButton {
    fn into_action_button(self) -> ActionButton {
        let id = self.id.unwrap_or_else(|| self.text.clone());
        ActionButton {
            id,
            text: self.text,
            icon: self.icon,
        }
    }
}

/// A decoded inbound payload.
///
/// The raw JSON object is retained alongside the typed fields; it is the
/// durable form that gets persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundPayload {
    #[serde(default)]
    pub alert: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub grp: Option<String>,
    #[serde(default)]
    pub grp_msg: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub pri: Option<i32>,
    #[serde(default)]
    pub collapse_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub vis: Option<i32>,
    #[serde(default)]
    pub sicon: Option<String>,
    #[serde(default)]
    pub licon: Option<String>,
    #[serde(default)]
    pub bicon: Option<String>,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default)]
    pub bgac: Option<String>,
    #[serde(default)]
    pub ledc: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub bg_img: Option<BackgroundImage>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub custom: Option<CustomData>,
    #[serde(skip)]
    raw: Map<String, Value>,
}

impl InboundPayload {
    /// Decode a payload from its JSON text.
    pub fn from_json(raw: &str) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Decode a payload from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let Value::Object(map) = value else {
            return Err(PayloadError::NotAnObject);
        };

        let mut payload: Self = serde_json::from_value(Value::Object(map.clone()))?;
        payload.raw = map;
        Ok(payload)
    }

    /// The stable id from `custom.i`, if this payload came from our backend.
    pub fn stable_id(&self) -> Option<&str> {
        self.custom
            .as_ref()
            .and_then(|custom| custom.notification_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Whether the payload carries a non-empty body.
    pub fn has_body(&self) -> bool {
        self.alert.as_deref().is_some_and(|body| !body.is_empty())
    }

    /// The button id attached by the platform layer when a button was tapped.
    pub fn action_selected(&self) -> Option<&str> {
        self.raw.get("actionSelected").and_then(Value::as_str)
    }

    /// The presentation id attached by the platform layer to an opened payload.
    pub fn presentation_id(&self) -> Option<i32> {
        self.raw
            .get("notificationId")
            .and_then(Value::as_i64)
            .and_then(|id| i32::try_from(id).ok())
    }

    /// The raw JSON object.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Serialize the raw object back to JSON text.
    pub fn to_json_string(&self) -> String {
        Value::Object(self.raw.clone()).to_string()
    }

    /// Expand the short-key `o` button array into `custom.a.actionButtons`.
    ///
    /// Each entry `{n, i?, p?}` becomes `{id, text, icon?}`, with `id`
    /// falling back to the text. `actionSelected` is set to
    /// [`DEFAULT_ACTION`]. Returns `Ok(false)` when there is nothing to expand.
    pub fn expand_action_buttons(&mut self) -> Result<bool, PayloadError> {
        let Some(short_buttons) = self.raw.get("o").cloned() else {
            return Ok(false);
        };

        let buttons: Vec<ShortKeyButton> = decode_embedded(short_buttons)
            .ok_or_else(|| PayloadError::InvalidButtons("expected an array of {n, i?, p?}".into()))?;

        let mut custom = self
            .raw
            .get("custom")
            .cloned()
            .and_then(decode_embedded::<Map<String, Value>>)
            .unwrap_or_default();

        let mut additional = match custom.remove("a") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let expanded: Vec<Value> = buttons
            .into_iter()
            .map(|button| serde_json::to_value(button.into_action_button()))
            .collect::<Result<_, _>>()?;

        additional.insert("actionButtons".to_string(), Value::Array(expanded));
        additional.insert(
            "actionSelected".to_string(),
            Value::String(DEFAULT_ACTION.to_string()),
        );
        custom.insert("a".to_string(), Value::Object(additional));

        self.raw.remove("o");
        self.raw.insert(
            "custom".to_string(),
            Value::String(Value::Object(custom.clone()).to_string()),
        );
        self.custom = serde_json::from_value(Value::Object(custom)).ok();

        Ok(true)
    }
}

/// Decode a nested JSON value that may be encoded as a string.
pub(crate) fn decode_embedded<T: DeserializeOwned>(value: Value) -> Option<T> {
    let decoded = match value {
        Value::Null => return None,
        Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    };

    match decoded {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Ignoring undecodable nested payload field: {}", e);
            None
        }
    }
}

fn embedded_json<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(decode_embedded))
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_i64().and_then(|n| i32::try_from(n).ok()),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stable_id_from_encoded_custom() {
        let payload = InboundPayload::from_json(
            r#"{"alert":"hi","custom":"{\"i\":\"n-1\",\"u\":\"example.com\"}"}"#,
        )
        .unwrap();

        assert_eq!(payload.stable_id(), Some("n-1"));
        assert_eq!(
            payload.custom.unwrap().launch_url.as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn test_stable_id_from_object_custom() {
        let payload =
            InboundPayload::from_value(json!({"custom": {"i": "n-2"}})).unwrap();
        assert_eq!(payload.stable_id(), Some("n-2"));
    }

    #[test]
    fn test_missing_or_broken_custom_is_not_ours() {
        let missing = InboundPayload::from_json(r#"{"alert":"hi"}"#).unwrap();
        assert!(missing.stable_id().is_none());

        let broken = InboundPayload::from_json(r#"{"alert":"hi","custom":"{not json"}"#).unwrap();
        assert!(broken.stable_id().is_none());

        let empty = InboundPayload::from_json(r#"{"custom":"{\"i\":\"\"}"}"#).unwrap();
        assert!(empty.stable_id().is_none());
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(matches!(
            InboundPayload::from_json("[1,2]"),
            Err(PayloadError::NotAnObject)
        ));
        assert!(matches!(
            InboundPayload::from_json("{oops"),
            Err(PayloadError::Json(_))
        ));
    }

    #[test]
    fn test_lenient_numbers() {
        let payload = InboundPayload::from_json(r#"{"pri":"5","vis":1}"#).unwrap();
        assert_eq!(payload.pri, Some(5));
        assert_eq!(payload.vis, Some(1));
    }

    #[test]
    fn test_has_body() {
        assert!(InboundPayload::from_json(r#"{"alert":"x"}"#).unwrap().has_body());
        assert!(!InboundPayload::from_json(r#"{"alert":""}"#).unwrap().has_body());
        assert!(!InboundPayload::from_json(r#"{}"#).unwrap().has_body());
    }

    #[test]
    fn test_expand_action_buttons() {
        let mut payload = InboundPayload::from_value(json!({
            "alert": "Choose",
            "custom": "{\"i\":\"n-3\",\"a\":{\"k\":\"v\"}}",
            "o": "[{\"n\":\"Yes\",\"i\":\"y\",\"p\":\"icon1\"},{\"n\":\"No\"}]"
        }))
        .unwrap();

        assert!(payload.expand_action_buttons().unwrap());
        assert!(!payload.raw().contains_key("o"));

        let additional = payload
            .custom
            .as_ref()
            .and_then(|custom| custom.additional_data.clone())
            .unwrap();
        assert_eq!(additional["k"], "v");
        assert_eq!(additional["actionSelected"], DEFAULT_ACTION);
        assert_eq!(
            additional["actionButtons"],
            json!([
                {"id": "y", "text": "Yes", "icon": "icon1"},
                {"id": "No", "text": "No"}
            ])
        );

        // The rewritten custom block must survive a round trip through the raw form.
        let reparsed = InboundPayload::from_json(&payload.to_json_string()).unwrap();
        assert_eq!(reparsed.stable_id(), Some("n-3"));
    }

    #[test]
    fn test_expand_without_buttons_is_noop() {
        let mut payload = InboundPayload::from_json(r#"{"custom":"{\"i\":\"n\"}"}"#).unwrap();
        assert!(!payload.expand_action_buttons().unwrap());
    }

    #[test]
    fn test_expand_rejects_buttons_without_text() {
        let mut payload =
            InboundPayload::from_json(r#"{"custom":"{\"i\":\"n\"}","o":"[{\"i\":\"y\"}]"}"#)
                .unwrap();
        assert!(matches!(
            payload.expand_action_buttons(),
            Err(PayloadError::InvalidButtons(_))
        ));
        assert!(payload.raw().contains_key("o"));
    }
}
