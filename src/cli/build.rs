//! One-shot static render of every view.

use std::fs;

use anyhow::{Context as _, Result};

use crate::context::Context;
use crate::log;
use crate::render::RenderParams;
use crate::view::ViewId;

/// Render all views into the project's `_build/` directory.
///
/// Always writes the resolved markup; with `image` also rasterizes and
/// writes the quantized PNG frame for each view.
pub fn run(context: &Context, image: bool) -> Result<()> {
    context.poll().context("failed to fetch user data")?;

    let build_dir = context.paths().build_dir();
    fs::create_dir_all(&build_dir)
        .with_context(|| format!("failed to create {}", build_dir.display()))?;

    let params = RenderParams::default();
    for view in ViewId::ALL {
        let html = context.render_html(view, &params)?;
        fs::write(build_dir.join(format!("{view}.html")), html)?;

        if image {
            let frame = context.render_png(view, &params)?;
            fs::write(build_dir.join(format!("{view}.png")), &frame.bytes)?;
            log!("build"; "{}.png: {} bytes ({})", view, frame.size(), frame.budget.as_str());
        }
    }

    log!("build"; "wrote {} view(s) to {}", ViewId::ALL.len(), build_dir.display());
    Ok(())
}
