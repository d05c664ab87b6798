//! Live reload over WebSocket.
//!
//! Open preview tabs hold a WebSocket connection; whenever project state
//! changes, every tab receives one reload message and refetches its view.
//! Delivery is best effort: a dead connection is dropped, never retried.
//!
//! # Modules
//!
//! - `message` - Wire message types (reload, connected, watcher_stopped)
//! - `server` - TCP acceptor feeding connections to the broadcast actor

pub mod message;
pub mod server;

pub use message::LiveMessage;
pub use server::start_ws_server;
