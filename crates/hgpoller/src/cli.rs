//! Command-line interface definition using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Build version string with git hash and build date.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    // Format: "0.1.0 (abc1234, 2026-01-29)"
    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// hgpoller - turn new commits of remote Mercurial repositories into changes
#[derive(Parser, Debug)]
#[command(name = "hgpoller")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, env = "HGPOLLER_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a repository to poll
    Add {
        /// Remote repository URL
        #[arg(required = true)]
        repo_url: String,

        /// Local working copy (default: a directory named after the source)
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Branch to poll, repeatable (default: default)
        #[arg(short = 'b', long = "branch")]
        branches: Vec<String>,

        /// Bookmark to poll, repeatable
        #[arg(short = 'B', long = "bookmark")]
        bookmarks: Vec<String>,

        /// Source name (default: the repository URL)
        #[arg(short, long)]
        name: Option<String>,

        /// Project label attached to changes
        #[arg(long)]
        project: Option<String>,

        /// Category label attached to changes
        #[arg(long)]
        category: Option<String>,

        /// Mercurial executable
        #[arg(long, default_value = hgpoller_core::DEFAULT_HG_BIN)]
        hg_bin: String,

        /// Do not record commit times
        #[arg(long)]
        no_timestamps: bool,

        /// Seconds between polls
        #[arg(short, long, default_value_t = 600)]
        interval: u64,

        /// Poll as soon as the scheduler starts
        #[arg(long)]
        poll_at_launch: bool,
    },

    /// Unregister a repository
    Remove {
        /// Source name
        #[arg(required = true)]
        source: String,
    },

    /// List registered repositories
    List {
        /// Output format (table, json, brief)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Run one poll cycle now
    Poll {
        /// Source name (polls all if omitted)
        source: Option<String>,
    },

    /// Poll every repository on its interval until interrupted
    Run {
        /// Seconds between polls for every source, overriding their own
        #[arg(short, long)]
        interval: Option<u64>,

        /// Poll every source once right away
        #[arg(long)]
        poll_at_launch: bool,
    },

    /// Show the recorded head of every branch
    Status {
        /// Source name (shows all if omitted)
        source: Option<String>,
    },

    /// Show recorded changes, newest last
    Changes {
        /// Only changes of this source
        #[arg(long)]
        source: Option<String>,

        /// Number of changes to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Output format (table, json, brief)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Forget the recorded head so the next poll starts a new baseline
    Reset {
        /// Source name
        #[arg(required = true)]
        source: String,

        /// Branch or bookmark (resets all if omitted)
        branch: Option<String>,
    },

    /// Check that every configured Mercurial executable can be found
    Check,
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Brief,
}

impl Cli {
    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_add() {
        let cli = Cli::parse_from([
            "hgpoller",
            "add",
            "ssh://example.com/foo/baz",
            "-b",
            "default",
            "-b",
            "stable",
            "-B",
            "@",
        ]);
        match cli.command {
            Commands::Add {
                repo_url,
                branches,
                bookmarks,
                hg_bin,
                interval,
                no_timestamps,
                ..
            } => {
                assert_eq!(repo_url, "ssh://example.com/foo/baz");
                assert_eq!(branches, vec!["default", "stable"]);
                assert_eq!(bookmarks, vec!["@"]);
                assert_eq!(hg_bin, "hg");
                assert_eq!(interval, 600);
                assert!(!no_timestamps);
            }
            _ => panic!("Expected Add command"),
        }
    }

    #[test]
    fn test_cli_parse_poll() {
        let cli = Cli::parse_from(["hgpoller", "poll"]);
        assert!(matches!(cli.command, Commands::Poll { source: None }));

        let cli = Cli::parse_from(["hgpoller", "poll", "baz"]);
        match cli.command {
            Commands::Poll { source } => assert_eq!(source.as_deref(), Some("baz")),
            _ => panic!("Expected Poll command"),
        }
    }

    #[test]
    fn test_cli_parse_reset() {
        let cli = Cli::parse_from(["hgpoller", "reset", "baz", "stable"]);
        match cli.command {
            Commands::Reset { source, branch } => {
                assert_eq!(source, "baz");
                assert_eq!(branch.as_deref(), Some("stable"));
            }
            _ => panic!("Expected Reset command"),
        }
    }

    #[test]
    fn test_cli_verbose() {
        let cli = Cli::parse_from(["hgpoller", "status", "-vvv"]);
        assert_eq!(cli.verbose, 3);
        assert_eq!(cli.log_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_cli_help() {
        Cli::command().debug_assert();
    }
}
