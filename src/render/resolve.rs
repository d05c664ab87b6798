//! Markup resolution: view template plus current data, as one HTML document.
//!
//! Templating languages are deliberately out of scope here. The resolver
//! reads the raw per-view template from the project's `src/` directory and
//! wraps it in a self-contained document: viewport sizing, body classes for
//! the view and any requested screen classes, and the user data embedded as
//! a JSON script tag for templates that hydrate client-side.

use std::fs;

use serde_json::Value;

use crate::config::ProjectPaths;
use crate::error::CoreError;
use crate::render::RenderParams;
use crate::view::ViewId;

/// Produces the full HTML document the engine rasterizes.
pub trait MarkupResolver: Send + Sync {
    fn resolve(
        &self,
        view: ViewId,
        data: &Value,
        params: &RenderParams,
    ) -> Result<String, CoreError>;
}

/// File-backed resolver reading `src/{view}.html` from the project.
pub struct TemplateResolver {
    paths: ProjectPaths,
}

impl TemplateResolver {
    pub fn new(paths: ProjectPaths) -> Self {
        Self { paths }
    }
}

impl MarkupResolver for TemplateResolver {
    fn resolve(
        &self,
        view: ViewId,
        data: &Value,
        params: &RenderParams,
    ) -> Result<String, CoreError> {
        let path = self.paths.template(view);
        let body = fs::read_to_string(&path).map_err(|e| {
            CoreError::RenderEngine(format!("template {}: {e}", path.display()))
        })?;

        let (width, height) = params.viewport(view);
        let mut classes = vec!["screen".to_string(), view.as_str().to_string()];
        classes.extend(params.screen_classes.iter().cloned());

        // </script> inside a JSON string would terminate the tag early.
        let payload = data.to_string().replace("</", "<\\/");

        Ok(format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head>\n\
             <meta charset=\"utf-8\">\n\
             <style>\n\
             html, body {{ margin: 0; padding: 0; }}\n\
             body {{ width: {width}px; height: {height}px; overflow: hidden; }}\n\
             </style>\n\
             <script type=\"application/json\" id=\"user-data\">{payload}</script>\n\
             </head>\n\
             <body class=\"{classes}\">\n\
             {body}\n\
             </body>\n\
             </html>\n",
            classes = classes.join(" "),
        ))
    }
}
