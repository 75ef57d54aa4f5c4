use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] parqueo_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found: {0}")]
    RecordNotFound(String),
    #[error("Invalid timestamp '{0}'; expected RFC 3339, e.g. 2024-05-01T10:30:00Z")]
    InvalidTimestamp(String),
    #[error("Invalid date '{0}'; expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),
    #[error("Failed to read {path}: {source}")]
    Attachment { path: String, source: io::Error },
    #[error("Could not resolve the {0} directory")]
    MissingDirectory(&'static str),
}
