//! Error types for parqueo-core

use thiserror::Error;

/// Result type alias using parqueo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in parqueo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Bad user input, recovered locally and never retried
    #[error("{0}")]
    Validation(String),

    /// The remote store rejected a request while connectivity was reported.
    /// The message is the store's own text.
    #[error("{0}")]
    RemoteWrite(String),

    /// The connectivity monitor reports offline
    #[error("Remote store is unavailable while offline")]
    RemoteUnavailable,

    /// A deferred operation failed to replay; draining stopped at `position`
    #[error("Replay of queued operation #{position} failed: {message}")]
    QueueReplay { position: usize, message: String },

    /// Edits and deletes are only accepted while online
    #[error("Records cannot be edited or deleted while offline")]
    OfflineEditRejected,

    /// Another drainer holds a fresh queue lock
    #[error("Sync queue is being drained by another session")]
    QueueLocked,

    /// Record or unit not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error came from the remote store rejecting a request
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteWrite(_))
    }
}
