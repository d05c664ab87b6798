//! Messages passed between the core, the watcher, and the broadcaster.

use std::net::TcpStream;

use serde_json::Value;

use crate::view::ViewId;

/// One logical change to project state, emitted by the core exactly once per
/// mutation (webhook, config update, plugin import, watcher-triggered poll).
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// Templates or data changed; open previews should refetch.
    Reload { view: ViewId, user_data: Value },
    /// The filesystem watcher shut down and edits are no longer noticed.
    WatcherStopped { reason: String },
}

/// Inbox of the WebSocket broadcast actor.
#[derive(Debug)]
pub enum WsMsg {
    /// Fan a reload notification out to every connected preview.
    Reload { view: ViewId, user_data: Value },
    /// Tell previews the watcher died so they can warn the user.
    WatcherStopped,
    /// A freshly accepted (pre-handshake) preview connection.
    AddClient(TcpStream),
    /// Close all sessions and stop the actor.
    Shutdown,
}
