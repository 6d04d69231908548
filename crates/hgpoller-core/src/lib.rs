//! hgpoller core - the poll cycle and everything it reads.
//!
//! - **config**: state and configuration directories
//! - **source**: definition of a polled repository
//! - **hg**: the `hg` invocations of a cycle
//! - **parser**: decoders for their template output
//! - **engine**: the poll cycle itself

pub mod config;
pub mod engine;
pub mod error;
pub mod hg;
pub mod parser;
pub mod source;

pub use config::Paths;
pub use engine::{BranchOutcome, BranchReport, PollEngine, PollReport};
pub use error::{ConfigError, ParseFailure, PollError, Result};
pub use hg::HgCommands;
pub use parser::{parse_detail, parse_heads, parse_range, RevisionDetail};
pub use source::{load_sources, save_sources, PollerConfig, DEFAULT_BRANCH, DEFAULT_HG_BIN};
