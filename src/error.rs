//! Error types for the bot.
//!
//! Only `ConfigError` is fatal. Everything else is recovered per message: the
//! classifier degrades to the neutral intent, and the router turns store or
//! dispatch failures into a generic reply plus a log line.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration errors raised while reading the environment at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Failures talking to the completion service.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Completion response had no message content")]
    EmptyEnvelope,

    #[error("Completion request timed out after {0:?}")]
    Timeout(Duration),
}

/// Classifier output that does not match the expected shape.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty classifier output")]
    Empty,

    #[error("classifier output is not a label or JSON object: {0}")]
    Unrecognized(String),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("unknown intent label '{0}'")]
    UnknownLabel(String),

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Ticket store persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed ticket store {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize ticket store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outbound message failures.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to send message: {0}")]
    Send(#[from] serenity::Error),

    #[error("Reply sink rejected message: {0}")]
    Rejected(String),
}

/// Errors that reach the per-message handler boundary.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}
