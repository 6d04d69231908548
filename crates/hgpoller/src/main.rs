//! hgpoller CLI entry point.

use clap::Parser;
use hgpoller_core::Paths;
use tracing_subscriber::{fmt, EnvFilter};

use hgpoller::cli::Cli;
use hgpoller::commands;

fn main() {
    // Load .env.local if it exists (HGRCPATH, proxies, ...)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    let paths = match &cli.state_dir {
        Some(dir) => Paths::new(dir),
        None => Paths::from_env(),
    };
    if paths.load_env_file() {
        tracing::debug!(path = %paths.env_file().display(), "Loaded environment file");
    }

    if let Err(e) = commands::execute(cli.command, &paths) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
