//! Actor system for live preview updates.
//!
//! Message-passing concurrency for serve mode:
//!
//! ```text
//! FsActor ──poll──▶ Context ──ChangeEvent──▶ WsActor ──▶ preview tabs
//! (watch)          (state)                 (broadcast)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `ws` - WebSocket broadcast
//! - `coordinator` - Wires up and runs actors

pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod ws;

pub use coordinator::Coordinator;
pub use messages::{ChangeEvent, WsMsg};
