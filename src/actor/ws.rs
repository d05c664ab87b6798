//! WebSocket Actor - Live Update Broadcast
//!
//! This actor is responsible for:
//! - Accepting preview connections (handshake + connected message)
//! - Broadcasting reload notifications to all connected previews
//! - Reaping closed connections
//!
//! Delivery is best effort: a session that fails a send or reports a close
//! is dropped on the spot. A slow or dead preview never blocks the others,
//! and nothing is queued for it.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::messages::WsMsg;
use crate::reload::message::LiveMessage;

/// Where a session's bytes actually go. Production sessions wrap a
/// WebSocket; tests substitute an in-memory transport.
pub trait SessionTransport: Send {
    /// Send one text frame. `false` means the session is dead.
    fn send_text(&mut self, text: &str) -> bool;
    /// Non-blocking liveness check. `false` means the peer went away.
    fn poll_alive(&mut self) -> bool;
    fn close(&mut self);
}

/// One connected preview tab.
struct PreviewSession {
    transport: Box<dyn SessionTransport>,
}

/// WebSocket Actor - manages preview sessions and broadcasts
pub struct WsActor {
    /// Channel to receive messages
    rx: mpsc::Receiver<WsMsg>,
    /// Connected sessions (shared for broadcast + reaper threads)
    sessions: Arc<Mutex<Vec<PreviewSession>>>,
}

impl WsActor {
    pub fn new(rx: mpsc::Receiver<WsMsg>) -> Self {
        Self {
            rx,
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        // Background thread reaps sessions whose peer closed.
        let sessions_for_reaper = Arc::clone(&self.sessions);
        std::thread::spawn(move || {
            Self::reaper_loop(sessions_for_reaper);
        });

        while let Some(msg) = self.rx.recv().await {
            match msg {
                WsMsg::Reload { view, user_data } => {
                    crate::debug!("ws"; "broadcasting reload");
                    self.broadcast(&LiveMessage::reload(view, user_data).to_json());
                }

                WsMsg::WatcherStopped => {
                    self.broadcast(&LiveMessage::WatcherStopped.to_json());
                }

                WsMsg::AddClient(stream) => {
                    self.add_client(stream);
                }

                WsMsg::Shutdown => {
                    crate::debug!("ws"; "shutting down");
                    let mut sessions = self.sessions.lock();
                    for mut session in sessions.drain(..) {
                        session.transport.close();
                    }
                    break;
                }
            }
        }
    }

    /// Send one frame to every session, dropping the ones that fail.
    fn broadcast(&self, text: &str) {
        let mut sessions = self.sessions.lock();
        let count = sessions.len();

        if count == 0 {
            crate::debug!("ws"; "no previews connected");
            return;
        }

        sessions.retain_mut(|session| session.transport.send_text(text));
        crate::debug!("ws"; "broadcast to {} of {} previews", sessions.len(), count);
    }

    /// Perform the handshake and register a new session.
    fn add_client(&self, stream: TcpStream) {
        // Keep blocking mode during handshake, switch to non-blocking after
        match tungstenite::accept(stream) {
            Ok(mut ws) => {
                let _ = ws.get_ref().set_nonblocking(true);

                let mut transport = WsTransport { ws };
                if !transport.send_text(&LiveMessage::connected().to_json()) {
                    crate::log!("ws"; "failed to send connected message");
                    return;
                }

                let mut sessions = self.sessions.lock();
                sessions.push(PreviewSession {
                    transport: Box::new(transport),
                });
                crate::debug!("ws"; "preview connected (total: {})", sessions.len());
            }
            Err(e) => {
                crate::log!("ws"; "handshake failed: {}", e);
            }
        }
    }

    /// Background thread: poll sessions and remove closed ones.
    fn reaper_loop(sessions: Arc<Mutex<Vec<PreviewSession>>>) {
        loop {
            std::thread::sleep(std::time::Duration::from_millis(100));
            sessions
                .lock()
                .retain_mut(|session| session.transport.poll_alive());
        }
    }
}

// =============================================================================
// WebSocket transport
// =============================================================================

struct WsTransport {
    ws: WebSocket<TcpStream>,
}

impl SessionTransport for WsTransport {
    fn send_text(&mut self, text: &str) -> bool {
        match self.ws.send(Message::Text(text.into())) {
            Ok(_) => true,
            Err(e) => {
                crate::debug!("ws"; "preview disconnected: {}", e);
                false
            }
        }
    }

    fn poll_alive(&mut self) -> bool {
        // Non-blocking read; previews never send application data, so
        // anything but WouldBlock noise is a close or an error.
        match self.ws.read() {
            Ok(Message::Close(_)) => false,
            Ok(_) => true,
            Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => true,
            Err(_) => false,
        }
    }

    fn close(&mut self) {
        let _ = self.ws.close(None);
    }
}

// =============================================================================
// Tests
// =============================================================================
