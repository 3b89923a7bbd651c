//! Push notifications and notification clicks.

use chrono::Utc;
use serde::Serialize;

use crate::config::NotificationConfig;

/// Action ids offered on every notification.
pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

/// What the host should show for an incoming push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Milliseconds since the Unix epoch.
    pub date_of_arrival: i64,
    pub primary_key: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// What the host should do with its clients after a notification click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", content = "url", rename_all = "snake_case")]
pub enum ClientCommand {
    OpenWindow(String),
}

/// Builds the notification for a push; an empty or missing payload uses the
/// configured default body.
pub fn build_notification(config: &NotificationConfig, payload: Option<&str>) -> Notification {
    let body = match payload.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => config.default_body.clone(),
    };
    let action = |id: &str, title: &str| NotificationAction {
        action: id.to_owned(),
        title: title.to_owned(),
        icon: config.badge.clone(),
    };

    Notification {
        title: config.title.clone(),
        body,
        icon: config.icon.clone(),
        badge: config.badge.clone(),
        vibrate: vec![100, 50, 100],
        data: NotificationData {
            date_of_arrival: Utc::now().timestamp_millis(),
            primary_key: 1,
        },
        actions: vec![
            action(ACTION_EXPLORE, "Ver Vehículos"),
            action(ACTION_CLOSE, "Cerrar"),
        ],
    }
}

/// Maps a clicked action to a client command. `close` only dismisses.
pub fn resolve_click(action: Option<&str>) -> Option<ClientCommand> {
    match action {
        Some(ACTION_EXPLORE) => Some(ClientCommand::OpenWindow("/?section=explore".to_owned())),
        Some(ACTION_CLOSE) => None,
        _ => Some(ClientCommand::OpenWindow("/".to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text_becomes_body() {
        let n = build_notification(&NotificationConfig::default(), Some("Nuevo Corolla 2020"));
        assert_eq!(n.body, "Nuevo Corolla 2020");
        assert_eq!(n.title, "AutoMarket");
        assert_eq!(n.vibrate, vec![100, 50, 100]);
        assert_eq!(n.actions.len(), 2);
    }

    #[test]
    fn blank_payload_uses_default_body() {
        let config = NotificationConfig::default();
        assert_eq!(build_notification(&config, None).body, config.default_body);
        assert_eq!(build_notification(&config, Some("  ")).body, config.default_body);
    }

    #[test]
    fn serializes_camel_case() {
        let n = build_notification(&NotificationConfig::default(), None);
        let json = serde_json::to_value(&n).unwrap();
        assert!(json["data"]["dateOfArrival"].is_i64());
        assert_eq!(json["actions"][0]["action"], "explore");
    }

    #[test]
    fn click_actions() {
        assert_eq!(
            resolve_click(Some("explore")),
            Some(ClientCommand::OpenWindow("/?section=explore".to_owned()))
        );
        assert_eq!(resolve_click(Some("close")), None);
        assert_eq!(
            resolve_click(None),
            Some(ClientCommand::OpenWindow("/".to_owned()))
        );
        assert_eq!(
            resolve_click(Some("unknown")),
            Some(ClientCommand::OpenWindow("/".to_owned()))
        );
    }
}
