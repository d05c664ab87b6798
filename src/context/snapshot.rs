//! Immutable user-data snapshots.
//!
//! A snapshot maps every supported view to its render-ready data. Once
//! published it is never mutated; mutators build a new snapshot and swap it
//! in atomically, so readers observe either the old or the new state, never
//! a mix.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::view::ViewId;

/// The current render-ready data for all views.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    views: FxHashMap<ViewId, Value>,
}

impl Snapshot {
    /// Empty snapshot: every view present with an empty object, so reads
    /// before the first poll still resolve.
    pub fn empty() -> Self {
        Self::global(Value::Object(Map::new()))
    }

    /// Snapshot where every view carries the same data.
    ///
    /// Templates render per view but user data is project-global, so a poll
    /// publishes one value across the whole layout set.
    pub fn global(data: Value) -> Self {
        let views = ViewId::ALL.iter().map(|&v| (v, data.clone())).collect();
        Self { views }
    }

    pub fn get(&self, view: ViewId) -> Option<&Value> {
        self.views.get(&view)
    }

    /// Build the successor snapshot with `patch` shallow-merged into every
    /// view's slice. `self` is left untouched.
    pub fn merged(&self, patch: &Map<String, Value>) -> Self {
        let views = self
            .views
            .iter()
            .map(|(&view, data)| {
                let mut next = match data {
                    Value::Object(map) => map.clone(),
                    // Non-object slice: the patch replaces it wholesale.
                    _ => Map::new(),
                };
                for (key, value) in patch {
                    next.insert(key.clone(), value.clone());
                }
                (view, Value::Object(next))
            })
            .collect();
        Self { views }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_covers_all_views() {
        let snap = Snapshot::empty();
        for view in ViewId::ALL {
            assert_eq!(snap.get(view), Some(&json!({})));
        }
    }

    #[test]
    fn test_global_clones_data_per_view() {
        let snap = Snapshot::global(json!({"temp": 21}));
        assert_eq!(snap.get(ViewId::Full), Some(&json!({"temp": 21})));
        assert_eq!(snap.get(ViewId::Quadrant), Some(&json!({"temp": 21})));
    }

    #[test]
    fn test_merged_overlays_keys() {
        let snap = Snapshot::global(json!({"temp": 21, "city": "Berlin"}));
        let patch = json!({"temp": 18})
            .as_object()
            .cloned()
            .unwrap();

        let next = snap.merged(&patch);
        assert_eq!(
            next.get(ViewId::Full),
            Some(&json!({"temp": 18, "city": "Berlin"}))
        );
        // Original is untouched.
        assert_eq!(
            snap.get(ViewId::Full),
            Some(&json!({"temp": 21, "city": "Berlin"}))
        );
    }

    #[test]
    fn test_merged_replaces_non_object_slice() {
        let snap = Snapshot::global(json!([1, 2, 3]));
        let patch = json!({"x": 1}).as_object().cloned().unwrap();
        assert_eq!(snap.merged(&patch).get(ViewId::Full), Some(&json!({"x": 1})));
    }
}
