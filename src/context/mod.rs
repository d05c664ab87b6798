//! Central project state: config, plugin manifest, and the data snapshot.
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!  HTTP handlers ───▶  │           Context            │ ──▶ change events
//!  fs watcher    ───▶  │  config / plugin / snapshot  │     (one per
//!                      │   (ArcSwap, lock-free read)  │      mutation)
//!                      └──────────────────────────────┘
//! ```
//!
//! Reads are lock-free: every reader grabs an `Arc` of the current value and
//! keeps a consistent copy for the rest of its request. Mutations serialize
//! on one internal lock, and each successful mutation emits exactly one
//! change event. The context is created once at startup and passed to every
//! collaborator explicitly; there is no ambient global.

pub mod snapshot;
pub mod source;

pub use snapshot::Snapshot;
pub use source::{DataSource, SampleDataSource};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::actor::messages::ChangeEvent;
use crate::config::{PluginManifest, ProjectConfig, ProjectPaths};
use crate::error::CoreError;
use crate::render::{EncodedFrame, MarkupResolver, RenderEngine, RenderParams, quantize_and_encode};
use crate::view::ViewId;

// =============================================================================
// Archive extraction
// =============================================================================

/// Unpacks a plugin archive into the project source tree.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &[u8], dest: &Path) -> Result<(), CoreError>;
}

/// Extractor shelling out to `unzip`. Unpacks into a staging directory
/// first, so a corrupt archive never half-overwrites the source tree.
pub struct UnzipExtractor;

impl ArchiveExtractor for UnzipExtractor {
    fn extract(&self, archive: &[u8], dest: &Path) -> Result<(), CoreError> {
        let staging =
            tempfile::tempdir().map_err(|e| CoreError::Extract(format!("staging dir: {e}")))?;
        let zip_path = staging.path().join("plugin.zip");
        fs::write(&zip_path, archive)
            .map_err(|e| CoreError::Extract(format!("write archive: {e}")))?;

        let out_dir = staging.path().join("out");
        fs::create_dir(&out_dir)
            .map_err(|e| CoreError::Extract(format!("staging dir: {e}")))?;

        let output = Command::new("unzip")
            .arg("-o")
            .arg(&zip_path)
            .arg("-d")
            .arg(&out_dir)
            .output()
            .map_err(|e| CoreError::Extract(format!("unzip: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Extract(format!(
                "unzip exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        if dest.exists() {
            fs::remove_dir_all(dest)
                .map_err(|e| CoreError::Extract(format!("clear {}: {e}", dest.display())))?;
        }
        copy_tree(&out_dir, dest)
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(to)
        .map_err(|e| CoreError::Extract(format!("create {}: {e}", to.display())))?;
    let entries = fs::read_dir(from)
        .map_err(|e| CoreError::Extract(format!("read {}: {e}", from.display())))?;
    for entry in entries {
        let entry = entry.map_err(|e| CoreError::Extract(e.to_string()))?;
        let target = to.join(entry.file_name());
        let kind = entry
            .file_type()
            .map_err(|e| CoreError::Extract(e.to_string()))?;
        if kind.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| CoreError::Extract(format!("copy {}: {e}", target.display())))?;
        }
    }
    Ok(())
}

// =============================================================================
// Context
// =============================================================================

/// Replaceable collaborators behind the context's operations.
pub struct Collaborators {
    pub source: Box<dyn DataSource>,
    pub resolver: Box<dyn MarkupResolver>,
    pub engine: Box<dyn RenderEngine>,
    pub extractor: Box<dyn ArchiveExtractor>,
}

/// The single owner of mutable project state.
pub struct Context {
    paths: ProjectPaths,
    config: ArcSwap<ProjectConfig>,
    plugin: ArcSwap<PluginManifest>,
    snapshot: ArcSwap<Snapshot>,
    /// Serializes mutations. Readers never take it.
    write_lock: Mutex<()>,
    collab: Collaborators,
    change_tx: Sender<ChangeEvent>,
    change_rx: Mutex<Option<Receiver<ChangeEvent>>>,
}

impl Context {
    /// Load project state from disk. Does not poll; callers decide when the
    /// first fetch happens.
    pub fn open(paths: ProjectPaths, collab: Collaborators) -> Result<Self, CoreError> {
        let config = ProjectConfig::load(&paths.config_file())?;
        let plugin = PluginManifest::load(&paths.plugin_manifest())?;
        let (change_tx, change_rx) = unbounded();

        Ok(Self {
            paths,
            config: ArcSwap::from_pointee(config),
            plugin: ArcSwap::from_pointee(plugin),
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            write_lock: Mutex::new(()),
            collab,
            change_tx,
            change_rx: Mutex::new(Some(change_rx)),
        })
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn config(&self) -> Arc<ProjectConfig> {
        self.config.load_full()
    }

    pub fn plugin(&self) -> Arc<PluginManifest> {
        self.plugin.load_full()
    }

    /// Hand the change-event receiver to the coordinator. Yields once.
    pub fn take_change_events(&self) -> Option<Receiver<ChangeEvent>> {
        self.change_rx.lock().take()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current data slice for a view named in a request path.
    pub fn current_snapshot(&self, view: &str) -> Result<Value, CoreError> {
        let view = ViewId::parse(view)?;
        Ok(self.view_data(view))
    }

    fn view_data(&self, view: ViewId) -> Value {
        self.snapshot
            .load()
            .get(view)
            .cloned()
            .unwrap_or(Value::Object(Map::new()))
    }

    /// Resolve the view's template against the current snapshot.
    pub fn render_html(&self, view: ViewId, params: &RenderParams) -> Result<String, CoreError> {
        let data = self.view_data(view);
        self.collab.resolver.resolve(view, &data, params)
    }

    /// Full render path: resolve, rasterize, quantize, encode.
    pub fn render_png(
        &self,
        view: ViewId,
        params: &RenderParams,
    ) -> Result<EncodedFrame, CoreError> {
        let html = self.render_html(view, params)?;
        let (width, height) = params.viewport(view);
        let frame = self.collab.engine.render(&html, width, height)?;
        quantize_and_encode(&frame, params.depth())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Re-fetch user data and publish a new snapshot.
    ///
    /// On failure the previous snapshot stays published. Does not emit a
    /// change event; callers that represent a user-visible change announce
    /// it themselves.
    pub fn poll(&self) -> Result<(), CoreError> {
        let _guard = self.write_lock.lock();
        self.refresh_snapshot()
    }

    /// Fetch and swap. Caller must hold `write_lock`.
    fn refresh_snapshot(&self) -> Result<(), CoreError> {
        let config = self.config.load();
        let data = self.collab.source.fetch(&config)?;
        self.snapshot.store(Arc::new(Snapshot::global(data)));
        Ok(())
    }

    /// Merge an inbound webhook body into the published snapshot.
    ///
    /// Accepts either `{"merge_variables": {...}}` or a bare JSON object.
    /// A body that is neither mutates nothing.
    pub fn ingest_webhook(&self, body: &[u8]) -> Result<(), CoreError> {
        let patch = parse_webhook(body)?;
        let user_data = {
            let _guard = self.write_lock.lock();
            let next = self.snapshot.load().merged(&patch);
            self.snapshot.store(Arc::new(next));
            self.view_data(ViewId::Full)
        };
        self.announce_reload(user_data);
        Ok(())
    }

    /// Replace the custom field values: validate, persist, reload, refresh.
    ///
    /// Every plugin field without a default must be present. The durable
    /// write happens before any in-memory change, so a failed write leaves
    /// the running state exactly as it was.
    pub fn update_custom_fields(
        &self,
        fields: BTreeMap<String, String>,
    ) -> Result<(), CoreError> {
        let user_data = {
            let _guard = self.write_lock.lock();

            let plugin = self.plugin.load();
            for key in plugin.required_keys() {
                if !fields.contains_key(key) {
                    return Err(CoreError::Validation(format!(
                        "missing required custom field `{key}`"
                    )));
                }
            }

            let mut candidate = ProjectConfig::clone(&self.config.load());
            candidate.custom_fields = fields;
            candidate.write(&self.paths.config_file())?;

            let reloaded = ProjectConfig::load(&self.paths.config_file())?;
            self.config.store(Arc::new(reloaded));
            self.refresh_snapshot()?;
            self.view_data(ViewId::Full)
        };
        self.announce_reload(user_data);
        Ok(())
    }

    /// Import a plugin archive: extract into `src/`, reset custom fields,
    /// reload config and manifest, refresh the snapshot.
    ///
    /// Extraction runs first; when it fails nothing is reset.
    pub fn hot_load_plugin(&self, archive: &[u8]) -> Result<(), CoreError> {
        let user_data = {
            let _guard = self.write_lock.lock();

            self.collab
                .extractor
                .extract(archive, &self.paths.src_dir())?;

            let mut candidate = ProjectConfig::clone(&self.config.load());
            candidate.custom_fields.clear();
            candidate.write(&self.paths.config_file())?;

            let config = ProjectConfig::load(&self.paths.config_file())?;
            let plugin = PluginManifest::load(&self.paths.plugin_manifest())?;
            self.config.store(Arc::new(config));
            self.plugin.store(Arc::new(plugin));
            self.refresh_snapshot()?;
            self.view_data(ViewId::Full)
        };
        self.announce_reload(user_data);
        Ok(())
    }

    // =========================================================================
    // Change events
    // =========================================================================

    /// Emit one reload event carrying the current data. Used by callers
    /// that refresh rather than mutate (manual poll, watcher).
    pub fn announce_change(&self) {
        self.announce_reload(self.view_data(ViewId::Full));
    }

    /// Emit one reload event. Mutators capture `user_data` before releasing
    /// the write lock, so the event always describes the change it announces.
    /// No-op when live reload is disabled or nobody is listening.
    fn announce_reload(&self, user_data: Value) {
        if !self.config.load().project.live_reload {
            return;
        }
        let _ = self.change_tx.send(ChangeEvent::Reload {
            view: ViewId::Full,
            user_data,
        });
    }

    pub fn announce_watcher_stopped(&self, reason: impl Into<String>) {
        let _ = self.change_tx.send(ChangeEvent::WatcherStopped {
            reason: reason.into(),
        });
    }
}

/// Pull the merge patch out of a webhook body.
fn parse_webhook(body: &[u8]) -> Result<Map<String, Value>, CoreError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| CoreError::MalformedPayload(e.to_string()))?;
    let Value::Object(mut map) = value else {
        return Err(CoreError::MalformedPayload(
            "payload must be a JSON object".to_string(),
        ));
    };
    match map.remove("merge_variables") {
        Some(Value::Object(vars)) => Ok(vars),
        Some(_) => Err(CoreError::MalformedPayload(
            "merge_variables must be an object".to_string(),
        )),
        None => Ok(map),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeSource {
        value: Value,
        fail: AtomicBool,
    }

    impl DataSource for FakeSource {
        fn fetch(&self, config: &ProjectConfig) -> Result<Value, CoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::DataFetch("offline".to_string()));
            }
            let mut data = self.value.clone();
            if let Value::Object(map) = &mut data {
                map.insert(
                    "custom_fields".to_string(),
                    serde_json::to_value(&config.custom_fields).unwrap(),
                );
            }
            Ok(data)
        }
    }

    struct FakeResolver;

    impl MarkupResolver for FakeResolver {
        fn resolve(
            &self,
            view: ViewId,
            data: &Value,
            _params: &RenderParams,
        ) -> Result<String, CoreError> {
            Ok(format!("<body class=\"{view}\">{data}</body>"))
        }
    }

    struct FakeEngine;

    impl RenderEngine for FakeEngine {
        fn render(&self, _html: &str, width: u32, height: u32) -> Result<DynamicImage, CoreError> {
            Ok(DynamicImage::new_luma8(width, height))
        }
    }

    struct FakeExtractor {
        fail: bool,
        manifest: &'static str,
    }

    impl ArchiveExtractor for FakeExtractor {
        fn extract(&self, _archive: &[u8], dest: &Path) -> Result<(), CoreError> {
            if self.fail {
                return Err(CoreError::Extract("bad archive".to_string()));
            }
            fs::create_dir_all(dest).unwrap();
            fs::write(dest.join("plugin.toml"), self.manifest).unwrap();
            fs::write(dest.join("sample.json"), "{}").unwrap();
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        context: Context,
        events: Receiver<ChangeEvent>,
    }

    fn harness_with(collab: Collaborators) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path().to_path_buf());
        fs::create_dir_all(paths.src_dir()).unwrap();
        let context = Context::open(paths, collab).unwrap();
        let events = context.take_change_events().unwrap();
        Harness {
            _dir: dir,
            context,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(Collaborators {
            source: Box::new(FakeSource {
                value: json!({"temp": 21}),
                fail: AtomicBool::new(false),
            }),
            resolver: Box::new(FakeResolver),
            engine: Box::new(FakeEngine),
            extractor: Box::new(FakeExtractor {
                fail: false,
                manifest: "name = \"weather\"\n",
            }),
        })
    }

    #[test]
    fn test_poll_publishes_snapshot_without_event() {
        let h = harness();
        h.context.poll().unwrap();
        assert_eq!(h.context.current_snapshot("full").unwrap()["temp"], json!(21));
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_poll_failure_retains_previous_snapshot() {
        // Publish via webhook first, then poll against a dead source.
        let failing = harness_with(Collaborators {
            source: Box::new(FakeSource {
                value: json!({}),
                fail: AtomicBool::new(true),
            }),
            resolver: Box::new(FakeResolver),
            engine: Box::new(FakeEngine),
            extractor: Box::new(FakeExtractor {
                fail: false,
                manifest: "",
            }),
        });
        failing
            .context
            .ingest_webhook(br#"{"temp": 18}"#)
            .unwrap();
        let err = failing.context.poll().unwrap_err();
        assert!(matches!(err, CoreError::DataFetch(_)));
        assert_eq!(
            failing.context.current_snapshot("full").unwrap()["temp"],
            json!(18)
        );
    }

    #[test]
    fn test_webhook_merge_variables_emits_one_event() {
        let h = harness();
        h.context.poll().unwrap();
        h.context
            .ingest_webhook(br#"{"merge_variables": {"temp": 18}}"#)
            .unwrap();

        assert_eq!(h.context.current_snapshot("full").unwrap()["temp"], json!(18));
        assert!(matches!(
            h.events.try_recv().unwrap(),
            ChangeEvent::Reload { view: ViewId::Full, .. }
        ));
        assert!(h.events.try_recv().is_err(), "expected exactly one event");
    }

    #[test]
    fn test_each_event_carries_its_own_mutation() {
        let h = harness();
        h.context.ingest_webhook(br#"{"temp": 18}"#).unwrap();
        h.context.ingest_webhook(br#"{"temp": 19}"#).unwrap();

        let first = h.events.try_recv().unwrap();
        let second = h.events.try_recv().unwrap();
        assert!(matches!(
            first,
            ChangeEvent::Reload { user_data, .. } if user_data["temp"] == json!(18)
        ));
        assert!(matches!(
            second,
            ChangeEvent::Reload { user_data, .. } if user_data["temp"] == json!(19)
        ));
    }

    #[test]
    fn test_webhook_bare_object_merges() {
        let h = harness();
        h.context.poll().unwrap();
        h.context.ingest_webhook(br#"{"city": "Berlin"}"#).unwrap();

        let data = h.context.current_snapshot("quadrant").unwrap();
        assert_eq!(data["city"], json!("Berlin"));
        assert_eq!(data["temp"], json!(21));
    }

    #[test]
    fn test_webhook_malformed_mutates_nothing() {
        let h = harness();
        h.context.poll().unwrap();

        for body in [&b"not json"[..], br#"[1, 2]"#, br#"{"merge_variables": 5}"#] {
            let err = h.context.ingest_webhook(body).unwrap_err();
            assert!(matches!(err, CoreError::MalformedPayload(_)));
        }
        assert_eq!(h.context.current_snapshot("full").unwrap(), json!({"temp": 21, "custom_fields": {}}));
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_update_custom_fields_persists_and_refreshes() {
        let h = harness();
        let mut fields = BTreeMap::new();
        fields.insert("city".to_string(), "Berlin".to_string());
        h.context.update_custom_fields(fields).unwrap();

        assert_eq!(h.context.config().custom_fields["city"], "Berlin");
        let on_disk = ProjectConfig::load(&h.context.paths().config_file()).unwrap();
        assert_eq!(on_disk.custom_fields["city"], "Berlin");
        assert_eq!(
            h.context.current_snapshot("full").unwrap()["custom_fields"]["city"],
            json!("Berlin")
        );
        assert!(matches!(
            h.events.try_recv().unwrap(),
            ChangeEvent::Reload { .. }
        ));
    }

    #[test]
    fn test_update_custom_fields_missing_required_rejected() {
        let h = harness();
        fs::write(
            h.context.paths().plugin_manifest(),
            r#"
            name = "weather"

            [[custom_fields]]
            keyname = "city"
            field_type = "text"
            "#,
        )
        .unwrap();
        // Re-open so the manifest is loaded.
        let paths = h.context.paths().clone();
        let context = Context::open(
            paths,
            Collaborators {
                source: Box::new(FakeSource {
                    value: json!({}),
                    fail: AtomicBool::new(false),
                }),
                resolver: Box::new(FakeResolver),
                engine: Box::new(FakeEngine),
                extractor: Box::new(FakeExtractor {
                    fail: false,
                    manifest: "",
                }),
            },
        )
        .unwrap();

        let err = context
            .update_custom_fields(BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("city")));
        assert!(!context.paths().config_file().exists(), "disk untouched");
    }

    #[test]
    fn test_update_custom_fields_persist_failure_leaves_memory() {
        let h = harness();
        // A directory where the config file should be makes the write fail.
        fs::create_dir(h.context.paths().config_file()).unwrap();

        let mut fields = BTreeMap::new();
        fields.insert("city".to_string(), "Berlin".to_string());
        let err = h.context.update_custom_fields(fields).unwrap_err();

        assert!(matches!(err, CoreError::Persist(..)));
        assert!(h.context.config().custom_fields.is_empty());
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_hot_load_plugin_resets_fields_and_reloads_manifest() {
        let h = harness_with(Collaborators {
            source: Box::new(FakeSource {
                value: json!({}),
                fail: AtomicBool::new(false),
            }),
            resolver: Box::new(FakeResolver),
            engine: Box::new(FakeEngine),
            extractor: Box::new(FakeExtractor {
                fail: false,
                manifest: "name = \"stocks\"\n",
            }),
        });
        let mut fields = BTreeMap::new();
        fields.insert("city".to_string(), "Berlin".to_string());
        h.context.update_custom_fields(fields).unwrap();
        let _ = h.events.try_recv();

        h.context.hot_load_plugin(b"zip bytes").unwrap();

        assert!(h.context.config().custom_fields.is_empty());
        assert_eq!(h.context.plugin().name.as_deref(), Some("stocks"));
        assert!(matches!(
            h.events.try_recv().unwrap(),
            ChangeEvent::Reload { .. }
        ));
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_hot_load_failed_extraction_changes_nothing() {
        let h = harness_with(Collaborators {
            source: Box::new(FakeSource {
                value: json!({}),
                fail: AtomicBool::new(false),
            }),
            resolver: Box::new(FakeResolver),
            engine: Box::new(FakeEngine),
            extractor: Box::new(FakeExtractor {
                fail: true,
                manifest: "",
            }),
        });
        let mut fields = BTreeMap::new();
        fields.insert("city".to_string(), "Berlin".to_string());
        h.context.update_custom_fields(fields).unwrap();
        let _ = h.events.try_recv();
        let before = ProjectConfig::clone(&h.context.config());

        let err = h.context.hot_load_plugin(b"zip bytes").unwrap_err();
        assert!(matches!(err, CoreError::Extract(_)));
        assert_eq!(ProjectConfig::clone(&h.context.config()), before);
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_unknown_view_is_not_found() {
        let h = harness();
        let err = h.context.current_snapshot("sidebar").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_live_reload_off_suppresses_events() {
        let h = harness();
        let mut config = ProjectConfig::clone(&h.context.config());
        config.project.live_reload = false;
        config.write(&h.context.paths().config_file()).unwrap();
        h.context
            .config
            .store(Arc::new(ProjectConfig::load(&h.context.paths().config_file()).unwrap()));

        h.context.ingest_webhook(br#"{"temp": 1}"#).unwrap();
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn test_render_png_uses_engine_viewport() {
        let h = harness();
        h.context.poll().unwrap();
        let frame = h
            .context
            .render_png(ViewId::Quadrant, &RenderParams::default())
            .unwrap();
        assert!(!frame.bytes.is_empty());
    }

    #[test]
    fn test_parse_webhook_variants() {
        assert_eq!(
            parse_webhook(br#"{"merge_variables": {"a": 1}}"#).unwrap(),
            json!({"a": 1}).as_object().cloned().unwrap()
        );
        assert_eq!(
            parse_webhook(br#"{"a": 1}"#).unwrap(),
            json!({"a": 1}).as_object().cloned().unwrap()
        );
        assert!(parse_webhook(b"42").is_err());
    }
}
