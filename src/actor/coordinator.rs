//! Actor Coordinator - wires up the live preview actor system.
//!
//! The Coordinator is a thin orchestrator that:
//! - Creates communication channels
//! - Bridges context change events onto the broadcast actor's inbox
//! - Runs the actors concurrently

use std::sync::Arc;

use anyhow::Result;
use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use super::fs::FsActor;
use super::messages::{ChangeEvent, WsMsg};
use super::ws::WsActor;
use crate::context::Context;

const CHANNEL_BUFFER: usize = 32;

/// Coordinator - wires up and runs the actor system.
pub struct Coordinator {
    context: Arc<Context>,
    ws_port: Option<u16>,
    watch: bool,
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    pub fn with_context(context: Arc<Context>) -> Self {
        Self {
            context,
            ws_port: None,
            watch: true,
            shutdown_rx: None,
        }
    }

    /// Set live reload WebSocket port.
    pub fn with_ws_port(mut self, port: u16) -> Self {
        self.ws_port = Some(port);
        self
    }

    /// Disable the filesystem watcher (`--no-watch`).
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    /// Set shutdown signal receiver.
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Run the actor system until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let (ws_tx, ws_rx) = mpsc::channel::<WsMsg>(CHANNEL_BUFFER);

        if let Some(port) = self.ws_port {
            match crate::reload::start_ws_server(port, ws_tx.clone()) {
                Ok(actual_port) => {
                    crate::cli::serve::set_actual_ws_port(actual_port);
                    crate::log!("ws"; "live reload on port {}", actual_port);
                }
                Err(e) => {
                    crate::log!("error"; "live reload listener failed: {}", e);
                }
            }
        }

        // Bridge: context change events (sync channel) -> WsActor inbox.
        if let Some(change_rx) = self.context.take_change_events() {
            let bridge_tx = ws_tx.clone();
            std::thread::spawn(move || {
                while let Ok(event) = change_rx.recv() {
                    let msg = match event {
                        ChangeEvent::Reload { view, user_data } => {
                            WsMsg::Reload { view, user_data }
                        }
                        ChangeEvent::WatcherStopped { reason } => {
                            crate::logger::status_warning(&format!(
                                "file watching stopped ({reason}), manual poll still works"
                            ));
                            WsMsg::WatcherStopped
                        }
                    };
                    if bridge_tx.blocking_send(msg).is_err() {
                        break; // Actor gone
                    }
                }
            });
        }

        let fs_handle = if self.watch {
            spawn_watcher(&self.context)
        } else {
            crate::log!("watch"; "file watching disabled");
            None
        };

        let ws_actor = WsActor::new(ws_rx);
        let ws_handle = tokio::spawn(async move { ws_actor.run().await });

        crate::debug!("actor"; "start");
        if let Some(rx) = self.shutdown_rx.take() {
            loop {
                if rx.try_recv().is_ok() {
                    crate::debug!("actor"; "shutdown signal received");
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        } else if let Some(fs) = fs_handle {
            let _ = fs.await;
        }

        let _ = ws_tx.send(WsMsg::Shutdown).await;
        let _ = tokio::time::timeout(std::time::Duration::from_millis(500), ws_handle).await;

        crate::debug!("actor"; "stopped");
        Ok(())
    }
}

/// Start the filesystem watcher. A watcher that cannot start only loses
/// live file watching; the broadcaster keeps running and manual polls,
/// webhooks and config updates still reach connected previews.
fn spawn_watcher(context: &Arc<Context>) -> Option<tokio::task::JoinHandle<()>> {
    let paths = context.paths();
    let roots = vec![paths.src_dir(), paths.config_file()];
    match FsActor::new(roots, Arc::clone(context)) {
        Ok(fs_actor) => Some(tokio::spawn(async move { fs_actor.run().await })),
        Err(e) => {
            crate::log!("error"; "watcher failed to start: {}", e);
            context.announce_watcher_stopped(format!("failed to start: {e}"));
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
