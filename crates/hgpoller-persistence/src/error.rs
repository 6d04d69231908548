//! Error types for persistence operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing persisted state.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", .path.display())]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("failed to read {}: {source}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process holds the lock.
    #[error("{} is locked{}", .path.display(), holder(.pid))]
    Locked { path: PathBuf, pid: Option<u32> },

    /// A sink refused the change.
    #[error("change rejected: {0}")]
    Rejected(String),
}

fn holder(pid: &Option<u32>) -> String {
    pid.map(|pid| format!(" by process {}", pid))
        .unwrap_or_default()
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
