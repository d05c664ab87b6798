//! FileSystem Actor
//!
//! Watches the template source tree and the config file, debounces bursts
//! of raw notify events into one logical change, then re-polls the context
//! and announces the change. The watcher starts immediately, so edits made
//! while the server is still starting are buffered, not lost.
//!
//! ```text
//! notify ──▶ Debouncer (timing + dedup) ──▶ Context::poll ──▶ ChangeEvent
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use crate::context::Context;

/// Quiet period after the last raw event before a change is processed.
const DEBOUNCE_MS: u64 = 200;
/// Minimum spacing between two processed changes.
const REPOLL_COOLDOWN_MS: u64 = 500;

/// Raw watcher output bridged onto the async loop.
enum BridgeEvent {
    Change(notify::Event),
    /// The watcher backend reported a fatal error.
    Failed(String),
}

/// FileSystem Actor - watches for project changes
pub struct FsActor {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    context: Arc<Context>,
    debouncer: Debouncer,
}

impl FsActor {
    /// Create a new FsActor watching the given roots.
    ///
    /// Directories are watched recursively, plain files directly. Missing
    /// roots are skipped; a fresh project may not have a config file yet.
    pub fn new(roots: Vec<PathBuf>, context: Arc<Context>) -> notify::Result<Self> {
        // notify's callback API is sync; bridge through a std channel
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        for root in &roots {
            if !root.exists() {
                continue;
            }
            let mode = if root.is_dir() {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(root, mode)?;
        }

        Ok(Self {
            notify_rx,
            watcher,
            context,
            debouncer: Debouncer::new(),
        })
    }

    /// Run the actor event loop
    pub async fn run(self) {
        let notify_rx = self.notify_rx;
        let context = self.context;
        let mut debouncer = self.debouncer;
        // Keep the watcher alive for the lifetime of the loop.
        let _watcher = self.watcher;

        let (async_tx, mut async_rx) = tokio::sync::mpsc::channel::<BridgeEvent>(64);

        // Poll notify events on a plain thread and forward them in.
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                let bridged = match result {
                    Ok(event) => BridgeEvent::Change(event),
                    Err(e) => BridgeEvent::Failed(e.to_string()),
                };
                if async_tx.blocking_send(bridged).is_err() {
                    break; // Receiver dropped
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                bridged = async_rx.recv() => match bridged {
                    Some(BridgeEvent::Change(event)) => debouncer.add_event(&event),
                    Some(BridgeEvent::Failed(reason)) => {
                        crate::log!("error"; "watcher stopped: {}", reason);
                        context.announce_watcher_stopped(reason);
                        break;
                    }
                    None => {
                        context.announce_watcher_stopped("event stream closed");
                        break;
                    }
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if let Some(paths) = debouncer.take_if_ready() {
                        process_change(&context, paths);
                    }
                }
            }
        }
    }
}

/// Handle one debounced batch: re-poll data, then announce a single change.
///
/// A failed poll keeps the previous snapshot but still announces; template
/// edits never go through the data source, so previews must refetch either
/// way.
fn process_change(context: &Context, paths: FxHashSet<PathBuf>) {
    crate::debug!("watch"; "{} path(s) changed", paths.len());
    match context.poll() {
        Ok(()) => crate::logger::status_success("change detected, previews refreshed"),
        Err(e) => crate::logger::status_error("re-poll failed", &e.to_string()),
    }
    context.announce_change();
}

// =============================================================================
// Debouncer
// =============================================================================

/// Pure debouncer: timing and path deduplication only.
struct Debouncer {
    changed: FxHashSet<PathBuf>,
    last_event: Option<std::time::Instant>,
    last_processed: Option<std::time::Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            changed: FxHashSet::default(),
            last_event: None,
            last_processed: None,
        }
    }

    /// Record a raw notify event, dropping noise.
    fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            EventKind::Modify(modify) => {
                // Metadata-only changes (mtime/chmod noise) can loop forever
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
            }
            _ => return,
        }

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            crate::debug!("watch"; "event: {}", path.display());
            self.changed.insert(path.clone());
            self.last_event = Some(std::time::Instant::now());
        }
    }

    /// Take the change set if debounce + cooldown elapsed.
    fn take_if_ready(&mut self) -> Option<FxHashSet<PathBuf>> {
        if !self.is_ready() {
            return None;
        }

        let changed = std::mem::take(&mut self.changed);
        self.last_event = None;

        if changed.is_empty() {
            return None;
        }

        self.last_processed = Some(std::time::Instant::now());
        Some(changed)
    }

    fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };

        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return false;
        }

        if let Some(last_processed) = self.last_processed
            && last_processed.elapsed() < Duration::from_millis(REPOLL_COOLDOWN_MS)
        {
            return false;
        }

        !self.changed.is_empty()
    }

    /// Precise sleep duration until next possible ready time.
    fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining =
            Duration::from_millis(DEBOUNCE_MS).saturating_sub(last_event.elapsed());

        let cooldown_remaining = self
            .last_processed
            .map(|t| Duration::from_millis(REPOLL_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, MetadataKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_debouncer_not_ready_within_window() {
        let mut d = Debouncer::new();
        d.add_event(&event(EventKind::Create(CreateKind::File), "/p/src/full.html"));
        assert!(!d.is_ready());
        assert!(d.take_if_ready().is_none());
    }

    #[test]
    fn test_debouncer_dedups_paths() {
        let mut d = Debouncer::new();
        for _ in 0..5 {
            d.add_event(&event(EventKind::Create(CreateKind::File), "/p/src/full.html"));
        }
        d.add_event(&event(EventKind::Create(CreateKind::File), "/p/src/sample.json"));
        assert_eq!(d.changed.len(), 2);
    }

    #[test]
    fn test_debouncer_ready_after_window() {
        let mut d = Debouncer::new();
        d.add_event(&event(EventKind::Create(CreateKind::File), "/p/src/full.html"));
        d.last_event = Some(std::time::Instant::now() - Duration::from_millis(DEBOUNCE_MS + 50));

        let paths = d.take_if_ready().unwrap();
        assert_eq!(paths.len(), 1);
        assert!(d.changed.is_empty());
        // Cooldown now applies.
        d.add_event(&event(EventKind::Create(CreateKind::File), "/p/src/full.html"));
        d.last_event = Some(std::time::Instant::now() - Duration::from_millis(DEBOUNCE_MS + 50));
        assert!(!d.is_ready());
    }

    #[test]
    fn test_debouncer_ignores_metadata_and_temp_files() {
        let mut d = Debouncer::new();
        d.add_event(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
            "/p/src/full.html",
        ));
        d.add_event(&event(EventKind::Create(CreateKind::File), "/p/src/.full.html.swp"));
        d.add_event(&event(EventKind::Create(CreateKind::File), "/p/src/full.html~"));
        assert!(d.changed.is_empty());
    }

    #[test]
    fn test_sleep_duration_idle_is_long() {
        let d = Debouncer::new();
        assert!(d.sleep_duration() >= Duration::from_secs(3600));
    }
}
