//! A runner that replays scripted commands.
//!
//! Used by tests to describe, in order, the commands a poll cycle is expected
//! to issue and the output each one produces:
//!
//! ```
//! use hgpoller_exec::{Expect, ScriptedRunner};
//!
//! let runner = ScriptedRunner::new();
//! runner.expect(Expect::new("hg", ["init", "/some/dir"]));
//! runner.expect(
//!     Expect::new("hg", ["heads", "-r", "default"])
//!         .path("/some/dir")
//!         .stdout("73591"),
//! );
//! ```
//!
//! An expectation matches when the program is equal, the given arguments
//! are a prefix of the actual arguments and, if a path was given, the
//! working directory is equal.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{CommandFailure, CommandRunner, Environment, Invocation, Result};

#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Exit { code: i32, stderr: String },
}

/// One expected command and its scripted reply.
#[derive(Debug, Clone)]
pub struct Expect {
    program: String,
    args_prefix: Vec<String>,
    workdir: Option<PathBuf>,
    reply: Reply,
}

impl Expect {
    /// Expects `program` with arguments starting with `args`.
    ///
    /// Replies with empty output unless told otherwise.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args_prefix: args.into_iter().map(Into::into).collect(),
            workdir: None,
            reply: Reply::Stdout(String::new()),
        }
    }

    /// Requires the command to run in `dir`.
    pub fn path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Replies with `stdout`.
    pub fn stdout(mut self, stdout: impl Into<String>) -> Self {
        self.reply = Reply::Stdout(stdout.into());
        self
    }

    /// Replies with a non-zero exit.
    pub fn exit(mut self, code: i32, stderr: impl Into<String>) -> Self {
        self.reply = Reply::Exit {
            code,
            stderr: stderr.into(),
        };
        self
    }

    fn mismatch(&self, invocation: &Invocation) -> Option<String> {
        if invocation.program != self.program {
            return Some(format!("expected program `{}`", self.program));
        }
        if !invocation.args.starts_with(&self.args_prefix) {
            return Some(format!("expected arguments starting with {:?}", self.args_prefix));
        }
        match &self.workdir {
            Some(dir) if invocation.workdir.as_ref() != Some(dir) => {
                Some(format!("expected working directory {}", dir.display()))
            }
            _ => None,
        }
    }
}

/// Replays expected commands in order and records every invocation.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    expected: Mutex<VecDeque<Expect>>,
    calls: Mutex<Vec<Invocation>>,
    required_env: Mutex<Option<Environment>>,
}

impl ScriptedRunner {
    /// Creates a runner with no expectations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one expectation.
    pub fn expect(&self, expect: Expect) -> &Self {
        lock(&self.expected).push_back(expect);
        self
    }

    /// Queues several expectations.
    pub fn expect_commands(&self, expects: impl IntoIterator<Item = Expect>) -> &Self {
        lock(&self.expected).extend(expects);
        self
    }

    /// Requires every later invocation to carry at least these variables.
    pub fn expect_env(&self, env: Environment) -> &Self {
        *lock(&self.required_env) = Some(env);
        self
    }

    /// Returns the invocations received so far.
    pub fn calls(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }

    /// Number of expectations not consumed yet.
    pub fn remaining(&self) -> usize {
        lock(&self.expected).len()
    }

    /// Returns true once every expectation has been consumed.
    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<String> {
        lock(&self.calls).push(invocation.clone());
        let command = invocation.to_string();

        if let Some(env) = lock(&self.required_env).as_ref() {
            if !invocation.env.contains_all(env) {
                return Err(CommandFailure::Unexpected {
                    command,
                    reason: "environment is missing expected variables".to_string(),
                });
            }
        }

        let expect = lock(&self.expected)
            .pop_front()
            .ok_or_else(|| CommandFailure::Unexpected {
                command: command.clone(),
                reason: "no more commands were expected".to_string(),
            })?;

        if let Some(reason) = expect.mismatch(invocation) {
            return Err(CommandFailure::Unexpected { command, reason });
        }

        match expect.reply {
            Reply::Stdout(stdout) => Ok(stdout),
            Reply::Exit { code, stderr } => Err(CommandFailure::Exit {
                command,
                code: Some(code),
                stderr,
            }),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order() {
        let runner = ScriptedRunner::new();
        runner.expect_commands([
            Expect::new("hg", ["init"]),
            Expect::new("hg", ["heads", "-r"]).path("/w").stdout("5\n"),
        ]);

        let init = Invocation::new("hg").args(["init", "/w"]);
        assert_eq!(runner.run(&init).await.unwrap(), "");

        let heads = Invocation::new("hg")
            .args(["heads", "-r", "default", "--template={rev}\n"])
            .current_dir("/w");
        assert_eq!(runner.run(&heads).await.unwrap(), "5\n");

        assert!(runner.is_done());
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_argument_prefix_mismatch() {
        let runner = ScriptedRunner::new();
        runner.expect(Expect::new("hg", ["pull", "-b", "default"]));

        let inv = Invocation::new("hg").args(["pull", "-b", "stable"]);
        let err = runner.run(&inv).await.unwrap_err();
        assert!(matches!(err, CommandFailure::Unexpected { .. }));
    }

    #[tokio::test]
    async fn test_workdir_mismatch() {
        let runner = ScriptedRunner::new();
        runner.expect(Expect::new("hg", ["log"]).path("/some/dir"));

        let inv = Invocation::new("hg").arg("log").current_dir("/other");
        assert!(runner.run(&inv).await.is_err());
    }

    #[tokio::test]
    async fn test_unexpected_extra_command() {
        let runner = ScriptedRunner::new();
        let err = runner.run(&Invocation::new("hg")).await.unwrap_err();
        assert!(err.to_string().contains("no more commands"));
    }

    #[tokio::test]
    async fn test_scripted_exit() {
        let runner = ScriptedRunner::new();
        runner.expect(Expect::new("hg", ["pull"]).exit(255, "abort: no route"));

        let err = runner
            .run(&Invocation::new("hg").arg("pull"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandFailure::Exit { code: Some(255), .. }));
    }

    #[tokio::test]
    async fn test_required_environment() {
        let runner = ScriptedRunner::new();
        runner.expect_env(Environment::from_vars([("KEY", "TRUE")]));
        runner.expect_commands([Expect::new("hg", ["a"]), Expect::new("hg", ["b"])]);

        let good = Invocation::new("hg")
            .arg("a")
            .env(Environment::from_vars([("KEY", "TRUE"), ("OTHER", "x")]));
        assert!(runner.run(&good).await.is_ok());

        let bad = Invocation::new("hg").arg("b");
        assert!(runner.run(&bad).await.is_err());
    }
}
