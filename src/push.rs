//! Push notifications and host control messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BODY: &str = "New update available!";
const DEFAULT_ICON: &str = "/static/icons/icon-192.png";
const DEFAULT_BADGE: &str = "/static/icons/badge-72.png";

/// One button on a surfaced notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

/// A notification ready for the host display layer.
///
/// Transient: valid only for the duration of handling one push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub actions: Vec<NotificationAction>,
}

/// Fields a JSON push payload may supply; everything else is defaulted.
#[derive(Debug, Deserialize)]
struct PushFields {
  title: Option<String>,
  body: Option<String>,
  icon: Option<String>,
  actions: Option<Vec<NotificationAction>>,
}

impl NotificationPayload {
  /// Build a payload from opaque push data.
  ///
  /// A JSON object may supply any field; a plain-text payload becomes the
  /// body; absent data yields the full default notification.
  pub fn from_push(data: Option<&[u8]>, app_name: &str) -> Self {
    let mut payload = Self::default_for(app_name);
    let Some(data) = data else { return payload };

    match serde_json::from_slice::<PushFields>(data) {
      Ok(fields) => {
        if let Some(title) = fields.title {
          payload.title = title;
        }
        if let Some(body) = fields.body {
          payload.body = body;
        }
        if let Some(icon) = fields.icon {
          payload.icon = icon;
        }
        if let Some(actions) = fields.actions {
          payload.actions = actions;
        }
      }
      Err(_) => {
        // Not JSON: the whole payload is the body text.
        let text = String::from_utf8_lossy(data).trim().to_string();
        if !text.is_empty() {
          payload.body = text;
        }
      }
    }

    payload
  }

  fn default_for(app_name: &str) -> Self {
    Self {
      title: format!("{} Alert", app_name),
      body: DEFAULT_BODY.to_string(),
      icon: DEFAULT_ICON.to_string(),
      badge: DEFAULT_BADGE.to_string(),
      vibrate: vec![200, 100, 200],
      actions: vec![
        NotificationAction {
          action: "open".to_string(),
          title: "View Details".to_string(),
          icon: None,
        },
        NotificationAction {
          action: "dismiss".to_string(),
          title: "Close".to_string(),
          icon: None,
        },
      ],
    }
  }
}

/// Control messages the host application may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  /// Activate immediately instead of waiting out the old generation.
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  /// Pre-warm the cache with a list of URLs.
  #[serde(rename = "CACHE_URLS")]
  CacheUrls { urls: Vec<String> },
}

impl ControlMessage {
  /// Parse a raw message. Anything unrecognized is `None`, not an error.
  pub fn parse(value: &Value) -> Option<Self> {
    serde_json::from_value(value.clone()).ok()
  }
}

/// Where a chosen notification action should take the user.
pub fn click_target(action: &str) -> Option<String> {
  match action {
    "open" => Some("/".to_string()),
    _ => None,
  }
}
