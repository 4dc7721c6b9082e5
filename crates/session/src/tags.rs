//! Tag deltas against the server-confirmed view.

use serde_json::{Map, Value};
use tracing::{debug, error};

/// Confirmed server tags plus the delta not yet acknowledged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagState {
    confirmed: Map<String, Value>,
    pending: Map<String, Value>,
}

impl TagState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from tags the server already confirmed (e.g. loaded from the store).
    pub fn with_confirmed(confirmed: Map<String, Value>) -> Self {
        Self {
            confirmed,
            pending: Map::new(),
        }
    }

    /// Stage tag changes.
    ///
    /// Nested values are rejected. `null` and `""` mean delete and are kept
    /// only for keys that are already known. Other scalars are sent as
    /// strings. Values matching the confirmed value drop out of the delta.
    ///
    /// Returns the number of keys whose pending value changed.
    pub fn stage(&mut self, tags: &Map<String, Value>) -> usize {
        let mut changed = 0;

        for (key, value) in tags {
            let normalized = match value {
                Value::Array(_) | Value::Object(_) => {
                    error!(tag = %key, "Omitting nested tag value; tags must be scalars");
                    continue;
                }
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            if normalized.is_empty() && !self.is_known(key) {
                debug!(tag = %key, "Skipping delete of unknown tag");
                continue;
            }

            if self.confirmed.get(key).and_then(Value::as_str) == Some(normalized.as_str()) {
                if self.pending.remove(key).is_some() {
                    changed += 1;
                }
                continue;
            }

            let normalized = Value::String(normalized);
            if self.pending.get(key) != Some(&normalized) {
                self.pending.insert(key.clone(), normalized);
                changed += 1;
            }
        }

        changed
    }

    /// The delta still to be sent.
    pub fn delta(&self) -> Map<String, Value> {
        self.pending.clone()
    }

    /// Record that the server accepted `sent`.
    ///
    /// Pending entries changed since the snapshot stay pending.
    pub fn confirm(&mut self, sent: &Map<String, Value>) {
        for (key, value) in sent {
            if value.as_str() == Some("") {
                self.confirmed.remove(key);
            } else {
                self.confirmed.insert(key.clone(), value.clone());
            }
            if self.pending.get(key) == Some(value) {
                self.pending.remove(key);
            }
        }
    }

    /// Server tags only.
    pub fn confirmed(&self) -> &Map<String, Value> {
        &self.confirmed
    }

    /// Confirmed tags with the pending delta applied.
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = self.confirmed.clone();
        for (key, value) in &self.pending {
            if value.as_str() == Some("") {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Drop everything (user reset).
    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.pending.clear();
    }

    fn is_known(&self, key: &str) -> bool {
        self.confirmed.contains_key(key)
            || self
                .pending
                .get(key)
                .is_some_and(|value| value.as_str() != Some(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_delete_only_known_keys() {
        let mut tags = TagState::new();
        tags.stage(&map(json!({"a": "1"})));
        tags.stage(&map(json!({"a": "", "b": ""})));

        assert_eq!(tags.delta(), map(json!({"a": ""})));
    }

    #[test]
    fn test_values_stringified_nested_rejected() {
        let mut tags = TagState::new();
        let changed = tags.stage(&map(json!({
            "level": 5,
            "vip": true,
            "name": "ann",
            "list": [1, 2],
            "obj": {"x": 1}
        })));

        assert_eq!(changed, 3);
        assert_eq!(
            tags.delta(),
            map(json!({"level": "5", "vip": "true", "name": "ann"}))
        );
    }

    #[test]
    fn test_unchanged_confirmed_values_not_sent() {
        let mut tags = TagState::with_confirmed(map(json!({"a": "1", "b": "2"})));
        tags.stage(&map(json!({"a": "1", "b": "3"})));
        assert_eq!(tags.delta(), map(json!({"b": "3"})));

        // Reverting to the confirmed value clears the pending entry.
        tags.stage(&map(json!({"b": "2"})));
        assert!(tags.delta().is_empty());
    }

    #[test]
    fn test_confirm_and_merge() {
        let mut tags = TagState::with_confirmed(map(json!({"a": "1", "gone": "x"})));
        tags.stage(&map(json!({"b": "2", "gone": null})));
        let sent = tags.delta();

        // Changed after the snapshot was taken.
        tags.stage(&map(json!({"b": "9"})));
        tags.confirm(&sent);

        assert_eq!(tags.confirmed(), &map(json!({"a": "1", "b": "2"})));
        assert_eq!(tags.delta(), map(json!({"b": "9"})));
        assert_eq!(tags.merged(), map(json!({"a": "1", "b": "9"})));
    }
}
