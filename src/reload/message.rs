//! Live reload message protocol.
//!
//! JSON messages sent from the preview server to browser clients:
//!
//! - `reload`: project state changed, refetch the current view
//! - `connected`: handshake acknowledgement with the server version
//! - `watcher_stopped`: file watching died, edits are no longer noticed

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::view::ViewId;

/// Message sent over the live reload WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    /// Templates or data changed; the client refetches its view.
    Reload { view: ViewId, user_data: Value },

    /// Connection established.
    Connected { version: String },

    /// The filesystem watcher shut down; the client shows a warning.
    WatcherStopped,
}

impl LiveMessage {
    pub fn reload(view: ViewId, user_data: Value) -> Self {
        Self::Reload { view, user_data }
    }

    pub fn connected() -> Self {
        Self::Connected {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"reload"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reload_wire_format() {
        let msg = LiveMessage::reload(ViewId::Full, json!({"temp": 21}));
        let parsed: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(parsed["type"], "reload");
        assert_eq!(parsed["view"], "full");
        assert_eq!(parsed["user_data"]["temp"], 21);
    }

    #[test]
    fn test_connected_carries_version() {
        let parsed: Value = serde_json::from_str(&LiveMessage::connected().to_json()).unwrap();
        assert_eq!(parsed["type"], "connected");
        assert_eq!(parsed["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_watcher_stopped_wire_format() {
        let parsed: Value =
            serde_json::from_str(&LiveMessage::WatcherStopped.to_json()).unwrap();
        assert_eq!(parsed["type"], "watcher_stopped");
    }
}
