//! Supported view layouts.
//!
//! The layout set is fixed at startup: a template project renders the same
//! data into four device regions. Requests naming anything else are rejected
//! with `CoreError::NotFound`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A named display layout variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewId {
    Full,
    HalfHorizontal,
    HalfVertical,
    Quadrant,
}

impl ViewId {
    /// All supported layouts, in render order.
    pub const ALL: [ViewId; 4] = [
        ViewId::Full,
        ViewId::HalfHorizontal,
        ViewId::HalfVertical,
        ViewId::Quadrant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::HalfHorizontal => "half_horizontal",
            Self::HalfVertical => "half_vertical",
            Self::Quadrant => "quadrant",
        }
    }

    /// Parse a view name from a request path segment.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        match name {
            "full" => Ok(Self::Full),
            "half_horizontal" => Ok(Self::HalfHorizontal),
            "half_vertical" => Ok(Self::HalfVertical),
            "quadrant" => Ok(Self::Quadrant),
            other => Err(CoreError::NotFound(other.to_string())),
        }
    }

    /// Standard device dimensions in pixels (width, height).
    ///
    /// Used as the render viewport when a request does not specify one.
    pub fn device_size(self) -> (u32, u32) {
        match self {
            Self::Full => (800, 480),
            Self::HalfHorizontal => (800, 240),
            Self::HalfVertical => (400, 480),
            Self::Quadrant => (400, 240),
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        for view in ViewId::ALL {
            assert_eq!(ViewId::parse(view.as_str()).unwrap(), view);
        }
    }

    #[test]
    fn test_parse_unknown() {
        let err = ViewId::parse("home").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(name) if name == "home"));
    }

    #[test]
    fn test_device_sizes() {
        assert_eq!(ViewId::Full.device_size(), (800, 480));
        assert_eq!(ViewId::HalfHorizontal.device_size(), (800, 240));
        assert_eq!(ViewId::HalfVertical.device_size(), (400, 480));
        assert_eq!(ViewId::Quadrant.device_size(), (400, 240));
    }

    #[test]
    fn test_serde_name() {
        let json = serde_json::to_string(&ViewId::HalfVertical).unwrap();
        assert_eq!(json, "\"half_vertical\"");
    }
}
