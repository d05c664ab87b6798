//! HTTP response handlers.

use anyhow::Result;
use serde_json::{Value, json};
use tiny_http::{Header, Request, Response, StatusCode};

use crate::error::CoreError;

const HTML: &str = "text/html; charset=utf-8";
const JSON: &str = "application/json";
const PNG: &str = "image/png";

pub fn respond_html(request: Request, body: String) -> Result<()> {
    send_body(request, 200, HTML, body.into_bytes())
}

pub fn respond_png(request: Request, body: Vec<u8>) -> Result<()> {
    send_body(request, 200, PNG, body)
}

pub fn respond_json(request: Request, status: u16, value: &Value) -> Result<()> {
    respond_json_body(request, status, value.to_string())
}

pub fn respond_json_body(request: Request, status: u16, body: String) -> Result<()> {
    send_body(request, status, JSON, body.into_bytes())
}

pub fn respond_redirect(request: Request, location: &str) -> Result<()> {
    let response = Response::empty(StatusCode(302)).with_header(make_header("Location", location));
    request.respond(response)?;
    Ok(())
}

/// Respond with 503 Service Unavailable (server shutting down).
pub fn respond_unavailable(request: Request) -> Result<()> {
    send_body(
        request,
        503,
        "text/plain",
        b"503 Service Unavailable".to_vec(),
    )
}

/// Map a core error onto its status code with a JSON body.
pub fn respond_error(request: Request, error: &CoreError) -> Result<()> {
    respond_json(
        request,
        error.http_status(),
        &json!({"error": error.to_string()}),
    )
}

fn send_body(request: Request, status: u16, content_type: &str, body: Vec<u8>) -> Result<()> {
    let response = Response::from_data(body)
        .with_status_code(StatusCode(status))
        .with_header(make_header("Content-Type", content_type));
    request.respond(response)?;
    Ok(())
}

fn make_header(key: &str, value: &str) -> Header {
    Header::from_bytes(key.as_bytes(), value.as_bytes()).unwrap()
}
