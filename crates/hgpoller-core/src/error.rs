//! Error types for the poll engine.

use std::path::PathBuf;

use hgpoller_exec::CommandFailure;
use hgpoller_persistence::PersistenceError;
use thiserror::Error;

/// Command output that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// The heads listing was empty.
    #[error("no heads reported")]
    NoHeads,

    /// The heads listing has an empty line before its end.
    #[error("empty line {line} in heads listing")]
    BlankHead { line: usize },

    /// A range line is not `ordinal:revision`.
    #[error("malformed range line {line:?}")]
    MalformedRange { line: String },

    /// The detail output does not have all of its fields.
    #[error("expected {expected} detail fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// The date field does not start with a number of seconds.
    #[error("unparsable commit date {value:?}")]
    BadDate { value: String },
}

/// Reasons a poll cycle, or one branch of it, stopped early.
///
/// None of them leave partial state behind: the revision pointer only moves
/// once every change of the range has been stored.
#[derive(Debug, Error)]
pub enum PollError {
    /// An `hg` command failed or timed out.
    #[error(transparent)]
    Command(#[from] CommandFailure),

    /// An `hg` command produced output of the wrong shape.
    #[error("parse error: {0}")]
    Parse(#[from] ParseFailure),

    /// Reading or writing the revision pointer failed.
    #[error("revision store error: {0}")]
    Store(#[source] PersistenceError),

    /// The change sink did not accept a change.
    #[error("change sink error: {0}")]
    Sink(#[source] PersistenceError),
}

impl PollError {
    /// Returns true for failures caused by the external command.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, PollError::Command(_))
    }
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The sources file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sources file is not valid JSON.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the sources file failed.
    #[error(transparent)]
    Write(#[from] PersistenceError),

    /// A source definition is unusable.
    #[error("invalid source '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Result type for poll operations.
pub type Result<T> = std::result::Result<T, PollError>;
