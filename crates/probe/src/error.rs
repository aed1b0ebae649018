//! Error types for backend probing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Query on '{collection}' failed: {reason}")]
    Query { collection: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote function returned {status}: {message}")]
    Function { status: String, message: String },

    #[error("Replan window must be 1..=14 days, got {0}")]
    InvalidDays(u32),

    #[error("Snapshot error in {path}: {reason}")]
    Snapshot { path: String, reason: String },

    #[error(transparent)]
    Config(#[from] bobqa_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ProbeResult<T> = Result<T, ProbeError>;
