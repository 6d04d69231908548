//! Error types for command invocation.

use std::time::Duration;

use thiserror::Error;

/// Ways an external command can fail.
#[derive(Error, Debug)]
pub enum CommandFailure {
    /// The program could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child failed.
    #[error("io error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a non-zero status.
    #[error("`{command}` exited with status {}: {}", display_code(.code), .stderr.trim())]
    Exit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The program ran past its deadline and was killed.
    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// Standard output was not valid UTF-8.
    #[error("`{command}` produced output that is not valid UTF-8: {source}")]
    Decode {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// A scripted runner received a command it did not expect.
    #[error("unexpected command `{command}`: {reason}")]
    Unexpected { command: String, reason: String },
}

impl CommandFailure {
    /// Returns the command line that failed.
    pub fn command(&self) -> &str {
        match self {
            CommandFailure::Spawn { command, .. }
            | CommandFailure::Io { command, .. }
            | CommandFailure::Exit { command, .. }
            | CommandFailure::Timeout { command, .. }
            | CommandFailure::Decode { command, .. }
            | CommandFailure::Unexpected { command, .. } => command,
        }
    }

    /// Returns true if the command ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandFailure::Timeout { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Result type alias for command invocation.
pub type Result<T> = std::result::Result<T, CommandFailure>;
