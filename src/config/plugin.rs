//! Plugin metadata (`src/plugin.toml`).
//!
//! Field definitions are read-only: they describe how a custom field should
//! be presented (input kind, options, default) but never silently override a
//! value the user set explicitly. A field without a default is required.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Plugin manifest shipped inside the template source tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Human-readable plugin name.
    #[serde(default)]
    pub name: Option<String>,

    /// Custom field definitions, in presentation order.
    #[serde(default, rename = "custom_fields")]
    pub fields: Vec<PluginField>,
}

/// How a single custom field should be presented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginField {
    pub keyname: String,

    #[serde(default)]
    pub field_type: FieldType,

    /// Default value; a field without one must be supplied by the user.
    #[serde(default)]
    pub default: Option<String>,

    /// Enumerated choices for `select` fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Select,
}

impl PluginField {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

impl PluginManifest {
    /// Load the manifest from disk.
    ///
    /// A project without plugin metadata (no `plugin.toml` yet) gets an
    /// empty manifest: no definitions, no required keys.
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

    /// Keys that must be present in any custom-field update.
    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.keyname.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
        name = "Weather"

        [[custom_fields]]
        keyname = "city"
        description = "City to report"

        [[custom_fields]]
        keyname = "units"
        field_type = "select"
        default = "metric"
        options = ["metric", "imperial"]
    "#;

    #[test]
    fn test_parse_manifest() {
        let manifest: PluginManifest = toml::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("Weather"));
        assert_eq!(manifest.fields.len(), 2);
        assert_eq!(manifest.fields[0].field_type, FieldType::Text);
        assert_eq!(manifest.fields[1].field_type, FieldType::Select);
        assert_eq!(manifest.fields[1].options, ["metric", "imperial"]);
    }

    #[test]
    fn test_required_keys() {
        let manifest: PluginManifest = toml::from_str(MANIFEST).unwrap();
        let required: Vec<_> = manifest.required_keys().collect();
        // `units` has a default, so only `city` is required.
        assert_eq!(required, ["city"]);
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = PluginManifest::load(&dir.path().join("plugin.toml")).unwrap();
        assert!(manifest.fields.is_empty());
        assert_eq!(manifest.required_keys().count(), 0);
    }
}
