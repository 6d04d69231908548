//! Error types for the runtime crate.

use hgpoller_core::PollError;
use thiserror::Error;

/// Errors that can occur in the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A poll cycle failed as a whole.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// No source has this name.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Two sources share a name.
    #[error("source already registered: {0}")]
    SourceExists(String),

    /// A cycle of the source is already running.
    #[error("a poll of {0} is already in progress")]
    CycleInFlight(String),

    /// Runtime not started.
    #[error("runtime not started")]
    NotStarted,

    /// Runtime already started.
    #[error("runtime already started")]
    AlreadyStarted,

    /// Shutdown error.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
