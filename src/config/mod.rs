//! Project configuration management for `inkpeek.toml`.
//!
//! The config file is the durable copy of the project state. It is read and
//! replaced as a whole document; there are no partial updates at the storage
//! layer. The in-memory copy lives inside the `Context` and is reloaded from
//! disk after every write (including writes the core performed itself, so
//! memory always mirrors the durable document).
//!
//! # Sections
//!
//! | Section           | Purpose                                         |
//! |-------------------|-------------------------------------------------|
//! | `[project]`       | Rendering flags (live reload on/off)            |
//! | `[serve]`         | Preview server (port, interface, ws port)       |
//! | `[render]`        | Engine binary override, render timeout          |
//! | `[custom_fields]` | User-supplied values for plugin custom fields   |

pub mod plugin;

pub use plugin::{FieldType, PluginField, PluginManifest};

use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Config file name looked up in the project root.
pub const CONFIG_FILE: &str = "inkpeek.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing inkpeek.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub serve: ServeSection,

    #[serde(default)]
    pub render: RenderSection,

    /// Custom field key → value mapping, merged into polled user data.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
}

/// Rendering flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Push reload notifications to open preview tabs on change.
    #[serde(default = "default_true")]
    pub live_reload: bool,
}

/// Preview server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServeSection {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_interface")]
    pub interface: IpAddr,

    /// Base port for the live reload WebSocket listener.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
}

/// Raster rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSection {
    /// Explicit engine binary; auto-detected from PATH when unset.
    #[serde(default)]
    pub engine: Option<String>,

    /// Upper bound for a single render, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    4567
}

fn default_interface() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_ws_port() -> u16 {
    35729
}

fn default_timeout() -> u64 {
    20
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self { live_reload: true }
    }
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            interface: default_interface(),
            ws_port: default_ws_port(),
        }
    }
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            engine: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl ProjectConfig {
    /// Load the config document from disk.
    ///
    /// A missing file is not an error: a fresh project starts from defaults
    /// and gets a file on the first durable write.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::Persist(path.to_path_buf(), e))?;
        toml::from_str(&content).map_err(|e| {
            CoreError::Persist(
                path.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// Replace the durable document with this config.
    pub fn write(&self, path: &Path) -> Result<(), CoreError> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            CoreError::Persist(
                path.to_path_buf(),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        fs::write(path, content).map_err(|e| CoreError::Persist(path.to_path_buf(), e))
    }
}

// ============================================================================
// Project paths
// ============================================================================

/// Well-known locations inside a template project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Template source tree (watched for changes, overwritten by hot-load).
    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    pub fn template(&self, view: crate::view::ViewId) -> PathBuf {
        self.src_dir().join(format!("{view}.html"))
    }

    /// Sample user data consumed by the default data source.
    pub fn sample_data(&self) -> PathBuf {
        self.src_dir().join("sample.json")
    }

    /// Plugin metadata shipped inside the source tree.
    pub fn plugin_manifest(&self) -> PathBuf {
        self.src_dir().join("plugin.toml")
    }

    /// Output directory for the one-shot build command.
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("_build")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::default();
        assert!(config.project.live_reload);
        assert_eq!(config.serve.port, 4567);
        assert_eq!(config.render.timeout_secs, 20);
        assert!(config.custom_fields.is_empty());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, ProjectConfig::default());
    }

    #[test]
    fn test_write_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = ProjectConfig::default();
        config.project.live_reload = false;
        config.serve.port = 8080;
        config
            .custom_fields
            .insert("city".to_string(), "Berlin".to_string());

        config.write(&path).unwrap();
        let loaded = ProjectConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: ProjectConfig = toml::from_str(
            r#"
            [custom_fields]
            units = "metric"
            "#,
        )
        .unwrap();
        assert!(config.project.live_reload);
        assert_eq!(config.custom_fields["units"], "metric");
    }

    #[test]
    fn test_write_failure_is_persist_error() {
        let path = Path::new("/nonexistent-root/deep/inkpeek.toml");
        let err = ProjectConfig::default().write(path).unwrap_err();
        assert!(matches!(err, CoreError::Persist(..)));
    }

    #[test]
    fn test_paths() {
        let paths = ProjectPaths::new("/proj");
        assert_eq!(paths.config_file(), PathBuf::from("/proj/inkpeek.toml"));
        assert_eq!(
            paths.template(crate::view::ViewId::Quadrant),
            PathBuf::from("/proj/src/quadrant.html")
        );
    }
}
