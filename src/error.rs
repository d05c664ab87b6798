//! Core error taxonomy.
//!
//! Every state/render operation returns a typed `CoreError`; the HTTP layer
//! maps variants to status codes and the process never terminates on them.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the preview core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The user-data source could not be read. The previously published
    /// snapshot stays in place.
    #[error("data source unreachable: {0}")]
    DataFetch(String),

    /// An inbound webhook body could not be understood. No state is mutated.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// A request carried invalid input (missing required custom field,
    /// out-of-range color depth).
    #[error("{0}")]
    Validation(String),

    /// Writing the durable config document failed; in-memory state is
    /// left unchanged.
    #[error("failed to persist `{0}`")]
    Persist(PathBuf, #[source] std::io::Error),

    /// Plugin archive extraction failed before completion; no config
    /// reset happened.
    #[error("archive extraction failed: {0}")]
    Extract(String),

    /// The rendering engine did not finish within the configured budget.
    #[error("render timed out after {0:?}")]
    RenderTimeout(Duration),

    /// The rendering engine crashed or rejected the markup.
    #[error("render engine failed: {0}")]
    RenderEngine(String),

    /// The request referenced a view outside the supported layout set.
    #[error("unknown view `{0}`")]
    NotFound(String),
}

impl CoreError {
    /// HTTP status code the serve layer responds with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::MalformedPayload(_) => 400,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 422,
            Self::Persist(..) | Self::Extract(_) | Self::RenderEngine(_) => 500,
            Self::DataFetch(_) => 502,
            Self::RenderTimeout(_) => 504,
        }
    }
}
