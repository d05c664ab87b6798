//! User-data sources.
//!
//! The fetch mechanism is a collaborator seam: the core only needs "give me
//! the current render-ready value or fail". The default source reads the
//! project's `src/sample.json` and exposes the configured custom fields
//! alongside it, which is what a template project works against locally.

use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::config::ProjectConfig;
use crate::error::CoreError;

/// Where user data comes from on `poll()`.
pub trait DataSource: Send + Sync {
    fn fetch(&self, config: &ProjectConfig) -> Result<Value, CoreError>;
}

/// File-backed source reading `src/sample.json`.
pub struct SampleDataSource {
    path: PathBuf,
}

impl SampleDataSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DataSource for SampleDataSource {
    fn fetch(&self, config: &ProjectConfig) -> Result<Value, CoreError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            CoreError::DataFetch(format!("{}: {e}", self.path.display()))
        })?;
        let data: Value = serde_json::from_str(&raw).map_err(|e| {
            CoreError::DataFetch(format!("{}: {e}", self.path.display()))
        })?;

        let mut root = match data {
            Value::Object(map) => map,
            other => {
                // Non-object sample data is still usable; nest it.
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };

        // Custom fields ride along so templates can reference them, but an
        // explicit sample key of the same name wins.
        let fields: Map<String, Value> = config
            .custom_fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        root.entry("custom_fields".to_string())
            .or_insert(Value::Object(fields));

        Ok(Value::Object(root))
    }
}
