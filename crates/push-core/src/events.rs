//! Events delivered to developer handlers.

use std::str::FromStr;

use serde::Serialize;

use crate::presentation::PresentationNotification;

/// How notifications are presented while the app is in the foreground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum InFocusDisplayOption {
    /// Never auto-display while foregrounded; deliver to the received handler only.
    None,
    /// Show an in-app alert.
    #[default]
    InAppAlert,
    /// Show a regular system notification.
    Notification,
}

impl InFocusDisplayOption {
    /// Map the integer form used by host bindings (0, 1, 2).
    ///
    /// Negative values mean `None`, values above 2 mean `Notification`.
    pub fn from_code(code: i32) -> Self {
        match code {
            i32::MIN..=0 => Self::None,
            1 => Self::InAppAlert,
            _ => Self::Notification,
        }
    }

    /// Whether a displayable notification should still be shown while the app is foregrounded.
    pub fn shows_while_foreground(self) -> bool {
        matches!(self, Self::InAppAlert | Self::Notification)
    }

    /// Whether foreground notifications are shown as in-app alerts.
    pub fn is_in_app_alert(self) -> bool {
        self == Self::InAppAlert
    }
}

impl FromStr for InFocusDisplayOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(Self::None),
            "in_app_alert" | "inappalert" | "alert" | "1" => Ok(Self::InAppAlert),
            "notification" | "2" => Ok(Self::Notification),
            other => Err(format!("unknown in-focus display option: {}", other)),
        }
    }
}

/// How a notification reached the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisplayType {
    /// Not displayed (silent).
    None,
    /// Shown as an in-app alert.
    InAppAlert,
    /// Shown as a system notification.
    Notification,
}

/// A notification as reported to developer handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReceivedNotification {
    /// Platform presentation id, if one was assigned.
    pub presentation_id: Option<i32>,
    /// The (first) notification in the group.
    pub payload: PresentationNotification,
    /// Additional notifications when a summary was opened.
    pub grouped_notifications: Vec<PresentationNotification>,
    /// Whether the notification was displayed.
    pub shown: bool,
    /// Whether the app was in the foreground when the event was created.
    pub is_app_in_focus: bool,
    pub display_type: DisplayType,
}

/// What the user did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionType {
    /// The notification body was tapped.
    Opened,
    /// An action button was tapped.
    ActionTaken,
}

/// The action attached to an opened event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    /// Button id, when a button was tapped.
    pub action_id: Option<String>,
    pub kind: ActionType,
}

impl NotificationAction {
    /// Build the action from the selected button id, if any.
    pub fn from_selected(action_id: Option<String>) -> Self {
        let kind = if action_id.is_some() {
            ActionType::ActionTaken
        } else {
            ActionType::Opened
        };
        Self { action_id, kind }
    }
}

/// Payload of the "notification opened" handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenedResult {
    pub notification: ReceivedNotification,
    pub action: NotificationAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_option_codes() {
        assert_eq!(InFocusDisplayOption::from_code(-3), InFocusDisplayOption::None);
        assert_eq!(InFocusDisplayOption::from_code(0), InFocusDisplayOption::None);
        assert_eq!(InFocusDisplayOption::from_code(1), InFocusDisplayOption::InAppAlert);
        assert_eq!(InFocusDisplayOption::from_code(2), InFocusDisplayOption::Notification);
        assert_eq!(InFocusDisplayOption::from_code(9), InFocusDisplayOption::Notification);
    }

    #[test]
    fn test_display_option_parse() {
        assert_eq!(
            "notification".parse::<InFocusDisplayOption>().unwrap(),
            InFocusDisplayOption::Notification
        );
        assert_eq!(
            "IN_APP_ALERT".parse::<InFocusDisplayOption>().unwrap(),
            InFocusDisplayOption::InAppAlert
        );
        assert!("banner".parse::<InFocusDisplayOption>().is_err());
    }

    #[test]
    fn test_action_kind() {
        assert_eq!(NotificationAction::from_selected(None).kind, ActionType::Opened);
        assert_eq!(
            NotificationAction::from_selected(Some("y".into())).kind,
            ActionType::ActionTaken
        );
    }
}
