//! Preview server with live reload support.
//!
//! Thin HTTP layer over the `Context`: every route parses its input, calls
//! one core operation, and maps the result (or its `CoreError`) onto a
//! response. Requests run on a small thread pool so a slow render never
//! blocks polling or webhooks.
//!
//! # Routes
//!
//! | Route                       | Action                                  |
//! |-----------------------------|-----------------------------------------|
//! | `GET /`                     | Redirect to `/full`                     |
//! | `GET /<view>`               | Interactive preview page                |
//! | `GET /render/<view>.html`   | Resolved markup                         |
//! | `GET /render/<view>.png`    | Quantized PNG frame                     |
//! | `GET /render/<view>.size`   | Payload sizes + budget classification   |
//! | `GET /data`                 | Current snapshot, pretty-printed        |
//! | `GET /poll`                 | Manual re-poll, then redirect back      |
//! | `POST /webhook`             | Merge webhook payload into snapshot     |
//! | `GET/POST /api/config`      | Read / replace custom field values      |
//! | `POST /api/plugin`          | Hot-load a plugin archive               |

mod page;
mod response;

use std::collections::BTreeMap;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use crossbeam::channel::{self, Receiver};
use serde_json::json;
use tiny_http::{Method, Request, Server};

use crate::actor::Coordinator;
use crate::context::Context;
use crate::error::CoreError;
use crate::render::RenderParams;
use crate::view::ViewId;
use crate::{debug, log};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Actual live reload port (may differ from the configured one after retry).
/// Updated by the coordinator once the listener binds.
static ACTUAL_WS_PORT: AtomicU16 = AtomicU16::new(0);

pub fn set_actual_ws_port(port: u16) {
    ACTUAL_WS_PORT.store(port, Ordering::Relaxed);
}

fn get_actual_ws_port() -> u16 {
    ACTUAL_WS_PORT.load(Ordering::Relaxed)
}

/// Run the preview server until shutdown.
pub fn run(context: Arc<Context>, interface: IpAddr, port: u16, watch: bool) -> Result<()> {
    let (server, addr) = bind_with_retry(interface, port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    crate::shutdown::register_server(Arc::clone(&server), shutdown_tx);

    // First poll before serving; a failure is not fatal, the empty snapshot
    // still renders and the watcher/manual poll can recover.
    if let Err(e) = context.poll() {
        log!("error"; "initial poll failed: {}", e);
    }

    log!("serve"; "http://{}", addr);

    let ws_port = context.config().serve.ws_port;
    set_actual_ws_port(ws_port);
    let actor_handle = spawn_actors(Arc::clone(&context), watch, ws_port, shutdown_rx);

    run_request_loop(&server, &context);
    wait_for_shutdown(actor_handle);
    Ok(())
}

/// Bind to the specified interface and port, with automatic port retry.
fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < MAX_PORT_RETRIES => continue,
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to bind after {} attempts (ports {}-{}): {}",
                    MAX_PORT_RETRIES,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

/// Spawn the actor system (watcher + broadcaster) on its own runtime.
///
/// The broadcaster runs even with watching disabled; webhooks and config
/// updates still announce changes.
fn spawn_actors(
    context: Arc<Context>,
    watch: bool,
    ws_port: u16,
    shutdown_rx: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                log!("error"; "failed to create tokio runtime: {}", e);
                return;
            }
        };

        rt.block_on(async {
            let coordinator = Coordinator::with_context(context)
                .with_ws_port(ws_port)
                .with_watch(watch)
                .with_shutdown_signal(shutdown_rx);
            if let Err(e) = coordinator.run().await {
                log!("actor"; "error: {}", e);
            }
        });
    })
}

/// Wait for the actor system to shut down gracefully (max 2 seconds).
fn wait_for_shutdown(handle: JoinHandle<()>) {
    for _ in 0..40 {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        thread::sleep(std::time::Duration::from_millis(50));
    }
}

fn run_request_loop(server: &Server, context: &Arc<Context>) {
    // Requests run concurrently so a slow render never blocks a webhook.
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(4).build() {
        Ok(pool) => pool,
        Err(e) => {
            log!("error"; "failed to create thread pool: {}", e);
            return;
        }
    };

    for request in server.incoming_requests() {
        let context = Arc::clone(context);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &context) {
                log!("serve"; "request error: {e}");
            }
        });
    }
}

/// Handle a single HTTP request
fn handle_request(request: Request, context: &Context) -> Result<()> {
    if crate::shutdown::is_shutdown() {
        return response::respond_unavailable(request);
    }

    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));
    debug!("serve"; "{} {}", request.method(), path);

    match (request.method().clone(), path) {
        (Method::Get, "/") => response::respond_redirect(request, "/full"),

        (Method::Get, "/data") => match context.current_snapshot("full") {
            Ok(data) => {
                let pretty = serde_json::to_string_pretty(&data).unwrap_or_default();
                response::respond_json_body(request, 200, pretty)
            }
            Err(e) => response::respond_error(request, &e),
        },

        (Method::Get, "/poll") => match context.poll() {
            Ok(()) => {
                context.announce_change();
                let back = referer(&request).unwrap_or_else(|| "/full".to_string());
                response::respond_redirect(request, &back)
            }
            Err(e) => response::respond_error(request, &e),
        },

        (Method::Post, "/webhook") => {
            let (request, body) = read_body(request)?;
            match context.ingest_webhook(&body) {
                Ok(()) => response::respond_json(request, 200, &json!({"status": "ok"})),
                Err(e) => response::respond_error(request, &e),
            }
        }

        (Method::Get, "/api/config") => {
            let config = context.config();
            let plugin = context.plugin();
            response::respond_json(
                request,
                200,
                &json!({
                    "custom_fields": config.custom_fields,
                    "fields": plugin.fields,
                }),
            )
        }

        (Method::Post, "/api/config") => {
            let (request, body) = read_body(request)?;
            match parse_config_update(&body).and_then(|f| context.update_custom_fields(f)) {
                Ok(()) => response::respond_json(request, 200, &json!({"status": "ok"})),
                Err(e) => response::respond_error(request, &e),
            }
        }

        (Method::Post, "/api/plugin") => {
            let (request, body) = read_body(request)?;
            match context.hot_load_plugin(&body) {
                Ok(()) => response::respond_json(request, 200, &json!({"status": "ok"})),
                Err(e) => response::respond_error(request, &e),
            }
        }

        (Method::Get, path) if path.starts_with("/render/") => {
            handle_render(request, context, path, query)
        }

        (Method::Get, path) => match ViewId::parse(path.trim_start_matches('/')) {
            Ok(view) => response::respond_html(
                request,
                page::preview_page(view, get_actual_ws_port()),
            ),
            Err(e) => response::respond_error(request, &e),
        },

        _ => response::respond_error(request, &CoreError::NotFound(path.to_string())),
    }
}

/// Dispatch `/render/<view>.<ext>` requests.
fn handle_render(request: Request, context: &Context, path: &str, query: &str) -> Result<()> {
    let Some((view, ext)) = split_view_ext(path) else {
        return response::respond_error(request, &CoreError::NotFound(path.to_string()));
    };
    let view = match ViewId::parse(view) {
        Ok(view) => view,
        Err(e) => return response::respond_error(request, &e),
    };
    let params = parse_render_params(query);

    match ext {
        "html" => match context.render_html(view, &params) {
            Ok(html) => response::respond_html(request, html),
            Err(e) => response::respond_error(request, &e),
        },
        "png" => match context.render_png(view, &params) {
            Ok(frame) => response::respond_png(request, frame.bytes),
            Err(e) => response::respond_error(request, &e),
        },
        "size" => {
            let sized = context.render_html(view, &params).and_then(|html| {
                let frame = context.render_png(view, &params)?;
                Ok(json!({
                    "html_size": html.len(),
                    "png_size": frame.size(),
                    "png_budget": frame.budget.as_str(),
                }))
            });
            match sized {
                Ok(body) => response::respond_json(request, 200, &body),
                Err(e) => response::respond_error(request, &e),
            }
        }
        _ => response::respond_error(request, &CoreError::NotFound(path.to_string())),
    }
}

/// Split `/render/<view>.<ext>` into view name and extension.
fn split_view_ext(path: &str) -> Option<(&str, &str)> {
    path.strip_prefix("/render/")?.rsplit_once('.')
}

/// Parse render parameters from the query string.
fn parse_render_params(query: &str) -> RenderParams {
    let mut params = RenderParams::default();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "width" => params.width = value.parse().ok(),
            "height" => params.height = value.parse().ok(),
            "color_depth" => params.color_depth = value.parse().ok(),
            "screen_classes" => {
                params.screen_classes = value
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }
    params
}

/// Parse a `{"custom_fields": {...}}` config update body.
fn parse_config_update(body: &[u8]) -> Result<BTreeMap<String, String>, CoreError> {
    #[derive(serde::Deserialize)]
    struct ConfigUpdate {
        custom_fields: BTreeMap<String, String>,
    }

    let update: ConfigUpdate = serde_json::from_slice(body)
        .map_err(|e| CoreError::MalformedPayload(e.to_string()))?;
    Ok(update.custom_fields)
}

/// Read the request body, giving the request back for the response.
fn read_body(mut request: Request) -> Result<(Request, Vec<u8>)> {
    let mut body = Vec::new();
    request.as_reader().read_to_end(&mut body)?;
    Ok((request, body))
}

fn referer(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case("referer"))
        .map(|h| h.value.to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_view_ext() {
        assert_eq!(split_view_ext("/render/full.png"), Some(("full", "png")));
        assert_eq!(
            split_view_ext("/render/half_vertical.size"),
            Some(("half_vertical", "size"))
        );
        assert_eq!(split_view_ext("/render/full"), None);
        assert_eq!(split_view_ext("/data"), None);
    }

    #[test]
    fn test_parse_render_params() {
        let params =
            parse_render_params("width=640&height=384&color_depth=2&screen_classes=dark%20flipped");
        assert_eq!(params.width, Some(640));
        assert_eq!(params.height, Some(384));
        assert_eq!(params.color_depth, Some(2));
        assert_eq!(params.screen_classes, ["dark", "flipped"]);
    }

    #[test]
    fn test_parse_render_params_defaults() {
        let params = parse_render_params("");
        assert_eq!(params.width, None);
        assert_eq!(params.depth(), 1);
        assert!(params.screen_classes.is_empty());
    }

    #[test]
    fn test_parse_render_params_ignores_junk() {
        let params = parse_render_params("width=abc&color_depth=&other=1");
        assert_eq!(params.width, None);
        assert_eq!(params.color_depth, None);
    }

    #[test]
    fn test_parse_config_update() {
        let fields = parse_config_update(br#"{"custom_fields": {"city": "Berlin"}}"#).unwrap();
        assert_eq!(fields["city"], "Berlin");

        let err = parse_config_update(b"[]").unwrap_err();
        assert!(matches!(err, CoreError::MalformedPayload(_)));
    }
}
