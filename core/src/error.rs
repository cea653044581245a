//! Error types for the console pipeline.
//!
//! # Design
//! A send never fails with an error: transport failures become a status-0
//! response, undecodable JSON falls back to text, and rejected hook output is
//! skipped. `ConsoleError` therefore only covers the edges where the user
//! hands the console something it cannot use: the JSON argument editor and
//! configuration sources.

use thiserror::Error;

/// Errors surfaced to the user before a request is built.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The JSON argument editor does not hold a JSON object.
    #[error("invalid JSON arguments: {0}")]
    InvalidJsonArgs(String),

    /// A configuration value could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
