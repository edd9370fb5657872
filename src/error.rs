//! Error taxonomy for the telemetry core.

use std::path::PathBuf;

use thiserror::Error;

/// A binary packet could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("truncated packet: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unknown mode byte {0:#04x}")]
    UnknownMode(u8),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("malformed packet: {0}")]
    Format(#[from] FormatError),

    #[error("no trained model at {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("{operation} requires at least one row")]
    EmptyDataset { operation: &'static str },

    #[error("invalid model artifact: {0}")]
    ModelArtifact(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error("worker interrupted: {0}")]
    Interrupted(String),

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;
