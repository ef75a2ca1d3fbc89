//! Error Types

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors produced by the session store and its snapshot file
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Token is absent, expired or was deleted
    #[error("session not found: {0}")]
    NotFound(String),

    /// Snapshot could not be written to disk
    #[error("failed to write snapshot {path}: {source}")]
    PersistenceWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Snapshot could not be serialized
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    /// Snapshot on disk is unreadable or malformed
    #[error("snapshot {path} is corrupted: {reason}")]
    PersistenceCorruption { path: PathBuf, reason: String },

    /// Flush did not finish within the configured deadline
    #[error("snapshot flush exceeded deadline of {0:?}")]
    FlushTimeout(Duration),

    /// Background task panicked or was aborted
    #[error("background task failed: {0}")]
    Join(String),
}

/// Result type for session store operations
pub type Result<T> = std::result::Result<T, Error>;
