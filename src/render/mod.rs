//! Render pipeline: markup resolution, rasterization, quantized encoding.
//!
//! ```text
//! Snapshot --resolve--> HTML --engine--> raster frame --encode--> PNG bytes
//! ```
//!
//! Rendering is pull-based and stateless: every request resolves, rasters
//! and encodes independently; nothing is cached between calls.

pub mod encode;
pub mod engine;
pub mod resolve;

pub use encode::{EncodedFrame, PayloadBudget, quantize_and_encode};
pub use engine::{ChromiumEngine, MissingEngine, RenderEngine};
pub use resolve::{MarkupResolver, TemplateResolver};

use crate::view::ViewId;

/// Per-request render parameters. Constructed from the query string on each
/// HTTP call, never stored.
#[derive(Debug, Clone, Default)]
pub struct RenderParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub color_depth: Option<u8>,
    /// Arbitrary screen-class tags forwarded to the markup as body classes.
    pub screen_classes: Vec<String>,
}

impl RenderParams {
    /// Viewport for this request, defaulting to the view's device size.
    pub fn viewport(&self, view: ViewId) -> (u32, u32) {
        let (dw, dh) = view.device_size();
        (self.width.unwrap_or(dw), self.height.unwrap_or(dh))
    }

    /// Gray-level depth, defaulting to 1 bit (2 levels).
    pub fn depth(&self) -> u8 {
        self.color_depth.unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_defaults_to_device_size() {
        let params = RenderParams::default();
        assert_eq!(params.viewport(ViewId::Full), (800, 480));
        assert_eq!(params.viewport(ViewId::Quadrant), (400, 240));
    }

    #[test]
    fn test_viewport_override() {
        let params = RenderParams {
            width: Some(640),
            height: Some(384),
            ..Default::default()
        };
        assert_eq!(params.viewport(ViewId::Full), (640, 384));
    }

    #[test]
    fn test_depth_default() {
        assert_eq!(RenderParams::default().depth(), 1);
    }
}
