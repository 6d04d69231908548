//! External command invocation for hgpoller.
//!
//! This crate runs the `hg` subcommands the poll engine depends on:
//! - `CommandRunner` - the capability the engine is written against
//! - `ProcessRunner` - spawns real processes with a timeout
//! - `ScriptedRunner` - replays expected commands for tests
//! - `Environment` - a snapshot of the process environment
//!
//! # Example
//!
//! ```no_run
//! use hgpoller_exec::{CommandRunner, Environment, Invocation, ProcessRunner};
//!
//! # async fn demo() -> hgpoller_exec::Result<()> {
//! let runner = ProcessRunner::new();
//! let invocation = Invocation::new("hg")
//!     .args(["heads", "-r", "default", "--template={rev}\n"])
//!     .current_dir("/srv/mirror")
//!     .env(Environment::capture());
//!
//! let heads = runner.run(&invocation).await?;
//! println!("{}", heads);
//! # Ok(())
//! # }
//! ```
//!
//! Every invocation carries an explicit environment. Callers snapshot the
//! ambient environment once and pass it along, so the child sees exactly the
//! parent's variables and tests can check what each command received.

pub mod error;
pub mod invocation;
pub mod platform;
pub mod runner;
pub mod scripted;

pub use error::{CommandFailure, Result};
pub use invocation::{Environment, Invocation};
pub use runner::{CommandRunner, ProcessRunner, DEFAULT_COMMAND_TIMEOUT};
pub use scripted::{Expect, ScriptedRunner};
