//! Command runners.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::{CommandFailure, Invocation, Result};

/// Default deadline for a single command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Capability to run an external command and collect its standard output.
///
/// Implementations must install `invocation.env` as the child's complete
/// environment and must not retry.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command and returns its decoded standard output.
    ///
    /// # Errors
    ///
    /// Returns `CommandFailure` if the command cannot be spawned, exits
    /// non-zero, times out or writes non-UTF-8 output.
    async fn run(&self, invocation: &Invocation) -> Result<String>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    /// Creates a runner with the default timeout.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Sets the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the per-command timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Finds a program in PATH.
    pub fn locate(program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }

    /// Check if a program is available in PATH.
    pub fn is_available(program: &str) -> bool {
        Self::locate(program).is_some()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String> {
        let command = invocation.to_string();
        trace!(command = %command, workdir = ?invocation.workdir, "running command");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .env_clear()
            .envs(invocation.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.workdir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| CommandFailure::Spawn {
            command: command.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| CommandFailure::Io {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                debug!(command = %command, timeout_secs = self.timeout.as_secs(), "command timed out");
                return Err(CommandFailure::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
        };

        trace!(
            status = %output.status,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "command completed"
        );

        if !output.status.success() {
            return Err(CommandFailure::Exit {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|source| CommandFailure::Decode { command, source })
    }
}
