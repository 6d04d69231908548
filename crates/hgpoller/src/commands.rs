//! Command handlers for CLI subcommands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hgpoller_core::{
    load_sources, save_sources, BranchOutcome, Paths, PollEngine, PollReport, PollerConfig,
};
use hgpoller_exec::ProcessRunner;
use hgpoller_models::ChangeRecord;
use hgpoller_persistence::{
    JsonRevisionStore, JsonlChangeLog, LockFile, PersistenceError, RevisionStateStore,
};
use hgpoller_runtime::{PollEvent, Runtime, RuntimeConfig};
use tracing::{info, warn};

use crate::cli::{Commands, OutputFormat};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Execute a CLI command.
pub fn execute(command: Commands, paths: &Paths) -> Result<()> {
    match command {
        Commands::Add {
            repo_url,
            workdir,
            branches,
            bookmarks,
            name,
            project,
            category,
            hg_bin,
            no_timestamps,
            interval,
            poll_at_launch,
        } => {
            let mut config = PollerConfig::new(repo_url, PathBuf::new())
                .with_hg_bin(hg_bin)
                .with_timestamps(!no_timestamps)
                .with_bookmarks(bookmarks)
                .with_poll_interval(Duration::from_secs(interval))
                .with_poll_at_launch(poll_at_launch);
            if !branches.is_empty() {
                config = config.with_branches(branches);
            }
            if let Some(name) = name {
                config = config.with_name(name);
            }
            config.project = project;
            config.category = category;
            let default_workdir = PathBuf::from(config.source_id().as_str());
            config.workdir = workdir.unwrap_or(default_workdir);
            cmd_add(paths, config)
        }
        Commands::Remove { source } => cmd_remove(paths, &source),
        Commands::List { format } => cmd_list(paths, format),
        Commands::Poll { source } => block_on(cmd_poll(paths, source.as_deref())),
        Commands::Run {
            interval,
            poll_at_launch,
        } => block_on(cmd_run(paths, interval, poll_at_launch)),
        Commands::Status { source } => cmd_status(paths, source.as_deref()),
        Commands::Changes {
            source,
            limit,
            format,
        } => cmd_changes(paths, source.as_deref(), limit, format),
        Commands::Reset { source, branch } => cmd_reset(paths, &source, branch.as_deref()),
        Commands::Check => cmd_check(paths),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

/// Loads sources, optionally narrowed to the one named `only`.
fn sources(paths: &Paths, only: Option<&str>) -> Result<Vec<PollerConfig>> {
    let sources = load_sources(&paths.sources_file())?;
    match only {
        Some(name) => {
            let found: Vec<_> = sources.into_iter().filter(|s| s.name() == name).collect();
            if found.is_empty() {
                return Err(format!("Source not found: {}", name).into());
            }
            Ok(found)
        }
        None => Ok(sources),
    }
}

fn revision_store(paths: &Paths, config: &PollerConfig) -> JsonRevisionStore {
    JsonRevisionStore::new(paths.revision_file(&config.source_id()))
}

/// Claims a source for this process until the returned lock is dropped.
fn lock_source(paths: &Paths, config: &PollerConfig) -> Result<LockFile> {
    match LockFile::acquire(paths.source_lock_file(&config.source_id())) {
        Ok(lock) => Ok(lock),
        Err(PersistenceError::Locked { pid, .. }) => Err(format!(
            "{} is in use by another hgpoller process{}",
            config.name(),
            pid.map(|pid| format!(" (pid {})", pid)).unwrap_or_default()
        )
        .into()),
        Err(e) => Err(e.into()),
    }
}

/// Builds the engine of one source with on-disk state and real processes.
fn open_engine(paths: &Paths, config: &PollerConfig, log: Arc<JsonlChangeLog>) -> PollEngine {
    let mut config = config.clone();
    config.workdir = paths.resolve_workdir(&config.workdir);

    let runner = ProcessRunner::new().with_timeout(config.command_timeout);
    let store = revision_store(paths, &config);
    PollEngine::new(config, Arc::new(runner), Arc::new(store), log)
}

fn cmd_add(paths: &Paths, config: PollerConfig) -> Result<()> {
    config.validate()?;

    let mut sources = load_sources(&paths.sources_file())?;
    if sources.iter().any(|s| s.source_id() == config.source_id()) {
        return Err(format!("A source named '{}' already exists", config.name()).into());
    }

    info!(source = %config.name(), repo = %config.repo_url, "Adding source");

    println!("Added {}", config.name());
    println!("  {}", config.describe());
    if !ProcessRunner::is_available(&config.hg_bin) {
        println!("  Warning: '{}' was not found in PATH", config.hg_bin);
    }

    sources.push(config);
    save_sources(&paths.sources_file(), &sources)?;
    Ok(())
}

fn cmd_remove(paths: &Paths, name: &str) -> Result<()> {
    let mut sources = load_sources(&paths.sources_file())?;
    let before = sources.len();
    sources.retain(|s| s.name() != name);
    if sources.len() == before {
        return Err(format!("Source not found: {}", name).into());
    }
    save_sources(&paths.sources_file(), &sources)?;

    println!("Removed {}", name);
    println!("  Recorded heads and the working copy were left in place.");
    Ok(())
}

fn cmd_list(paths: &Paths, format: OutputFormat) -> Result<()> {
    let sources = sources(paths, None)?;

    match format {
        OutputFormat::Table => {
            if sources.is_empty() {
                println!("No sources configured.");
                return Ok(());
            }

            println!("{:<24}  {:<20}  {:>8}  REPOSITORY", "NAME", "BRANCHES", "INTERVAL");
            println!("{}", "-".repeat(80));
            for source in &sources {
                let targets: Vec<&str> = source.targets().collect();
                println!(
                    "{:<24}  {:<20}  {:>7}s  {}",
                    truncate(source.name(), 24),
                    truncate(&targets.join(","), 20),
                    source.poll_interval.as_secs(),
                    source.repo_url
                );
            }
            println!("\n{} source(s)", sources.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sources)?);
        }
        OutputFormat::Brief => {
            for source in &sources {
                println!("{}\t{}", source.name(), source.repo_url);
            }
        }
    }

    Ok(())
}

async fn cmd_poll(paths: &Paths, only: Option<&str>) -> Result<()> {
    let sources = sources(paths, only)?;
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    let log = Arc::new(JsonlChangeLog::open(paths.change_log_file())?);
    let mut failures = 0;

    for config in &sources {
        let _lock = match lock_source(paths, config) {
            Ok(lock) => lock,
            Err(e) => {
                println!("{}: skipped: {}", config.name(), e);
                failures += 1;
                continue;
            }
        };
        let mut engine = open_engine(paths, config, Arc::clone(&log));
        match engine.poll().await {
            Ok(report) => {
                print_report(config.name(), &report);
                if !report.is_success() {
                    failures += 1;
                }
            }
            Err(e) => {
                println!("{}: poll failed: {}", config.name(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{} source(s) did not poll cleanly", failures).into());
    }
    Ok(())
}

fn print_report(name: &str, report: &PollReport) {
    println!("{}", name);
    for branch in &report.branches {
        match &branch.result {
            Ok(outcome) => println!("  {}: {}", branch.branch, outcome),
            Err(e) => println!("  {}: failed: {}", branch.branch, e),
        }
    }
}

async fn cmd_run(paths: &Paths, interval: Option<u64>, poll_at_launch: bool) -> Result<()> {
    let sources = sources(paths, None)?;
    if sources.is_empty() {
        return Err("No sources configured; add one with `hgpoller add`".into());
    }

    let mut config = RuntimeConfig::new().with_poll_at_launch(poll_at_launch);
    if let Some(secs) = interval {
        config = config.with_interval_override(Duration::from_secs(secs.max(1)));
    }

    let locks = sources
        .iter()
        .map(|source| lock_source(paths, source))
        .collect::<Result<Vec<_>>>()?;

    let log = Arc::new(JsonlChangeLog::open(paths.change_log_file())?);
    let mut runtime = Runtime::new(config);
    for source in &sources {
        if !ProcessRunner::is_available(&source.hg_bin) {
            warn!(source = %source.name(), hg_bin = %source.hg_bin, "Mercurial executable not found in PATH");
        }
        runtime.add_source(open_engine(paths, source, Arc::clone(&log)))?;
    }

    let mut events = runtime.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event printer fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    runtime.start().await?;
    println!(
        "Polling {} source(s): {}. Press Ctrl-C to stop.",
        sources.len(),
        runtime.source_names().join(", ")
    );

    tokio::signal::ctrl_c().await?;
    println!("Stopping...");
    runtime.shutdown().await?;
    drop(runtime);
    let _ = printer.await;
    drop(locks);

    Ok(())
}

fn print_event(event: &PollEvent) {
    match event {
        PollEvent::BranchPolled {
            source,
            branch,
            outcome,
        } => match outcome {
            BranchOutcome::Unchanged { .. } => {}
            _ => println!("{} [{}]: {}", source, branch, outcome),
        },
        PollEvent::BranchFailed {
            source,
            branch,
            error,
        } => println!("{} [{}]: failed: {}", source, branch, error),
        PollEvent::CycleFailed { source, error } => println!("{}: poll failed: {}", source, error),
        PollEvent::CycleStarted { .. }
        | PollEvent::CycleSkipped { .. }
        | PollEvent::CycleCompleted { .. } => {}
    }
}

fn cmd_status(paths: &Paths, only: Option<&str>) -> Result<()> {
    let sources = sources(paths, only)?;
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    for source in &sources {
        let workdir = paths.resolve_workdir(&source.workdir);
        let pointers = revision_store(paths, source).list()?;

        println!("Source: {}", source.name());
        println!("  Repository: {}", source.repo_url);
        println!(
            "  Working copy: {}{}",
            workdir.display(),
            if workdir.join(".hg").is_dir() {
                ""
            } else {
                " (not initialized)"
            }
        );
        for target in source.targets() {
            match pointers.get(target) {
                Some(pointer) => println!("  {}: {}", target, pointer),
                None => println!("  {}: no baseline yet", target),
            }
        }
        println!();
    }

    Ok(())
}

fn cmd_changes(
    paths: &Paths,
    only: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let source = match only {
        Some(name) => Some(sources(paths, Some(name))?.remove(0)),
        None => None,
    };

    let log = JsonlChangeLog::open(paths.change_log_file())?;
    let changes = recent_changes(log.list()?, source.as_ref(), limit);

    match format {
        OutputFormat::Table => {
            if changes.is_empty() {
                println!("No changes recorded.");
                return Ok(());
            }

            println!("{:>5}  {:<12}  {:<12}  {:<24}  DESCRIPTION", "ID", "REVISION", "BRANCH", "AUTHOR");
            println!("{}", "-".repeat(80));
            for record in &changes {
                let change = &record.change;
                println!(
                    "{:>5}  {:<12}  {:<12}  {:<24}  {}",
                    record.id,
                    truncate(&change.revision, 12),
                    truncate(&change.branch, 12),
                    truncate(&change.author, 24),
                    truncate(change.description.lines().next().unwrap_or(""), 40)
                );
            }
            println!("\n{} change(s)", changes.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
        OutputFormat::Brief => {
            for record in &changes {
                println!("{}\t{}\t{}", record.id, record.change.branch, record.change.revision);
            }
        }
    }

    Ok(())
}

/// The last `limit` changes, optionally of one source, oldest first.
///
/// A source's changes are those of its repository on the branches and
/// bookmarks it polls.
fn recent_changes(
    records: Vec<ChangeRecord>,
    source: Option<&PollerConfig>,
    limit: usize,
) -> Vec<ChangeRecord> {
    let mut matching: Vec<ChangeRecord> = records
        .into_iter()
        .filter(|r| {
            source.map_or(true, |source| {
                r.change.repository == source.repo_url
                    && source.targets().any(|target| target == r.change.branch)
            })
        })
        .collect();
    let skip = matching.len().saturating_sub(limit);
    matching.drain(..skip);
    matching
}

fn cmd_reset(paths: &Paths, name: &str, branch: Option<&str>) -> Result<()> {
    let source = sources(paths, Some(name))?.remove(0);
    let _lock = lock_source(paths, &source)?;
    let store = revision_store(paths, &source);

    let targets: Vec<&str> = match branch {
        Some(branch) => {
            if !source.targets().any(|t| t == branch) {
                return Err(format!("{} does not poll '{}'", name, branch).into());
            }
            vec![branch]
        }
        None => source.targets().collect(),
    };

    for target in targets {
        store.clear(target)?;
        info!(source = %name, branch = %target, "Pointer reset");
        println!("{} [{}]: pointer cleared, next poll records a new baseline", name, target);
    }
    Ok(())
}

fn cmd_check(paths: &Paths) -> Result<()> {
    let sources = sources(paths, None)?;
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    let mut missing = 0;
    for source in &sources {
        match ProcessRunner::locate(&source.hg_bin) {
            Some(path) => println!("{}: {} -> {}", source.name(), source.hg_bin, path.display()),
            None => {
                println!("{}: {} not found", source.name(), source.hg_bin);
                missing += 1;
            }
        }
    }

    if missing > 0 {
        return Err(format!("{} source(s) cannot find their Mercurial executable", missing).into());
    }
    Ok(())
}

/// Truncates a string to the given length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgpoller_models::{ChangeId, NewChange, RevisionPointer};
    use hgpoller_persistence::ChangeSink;
    use tempfile::tempdir;

    fn add(paths: &Paths, repo: &str, name: Option<&str>) -> Result<()> {
        execute(
            Commands::Add {
                repo_url: repo.to_string(),
                workdir: None,
                branches: vec![],
                bookmarks: vec!["@".to_string()],
                name: name.map(String::from),
                project: None,
                category: None,
                hg_bin: "hg".to_string(),
                no_timestamps: false,
                interval: 60,
                poll_at_launch: false,
            },
            paths,
        )
    }

    #[test]
    fn test_add_and_list() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());

        add(&paths, "ssh://example.com/foo/baz", None).unwrap();
        add(&paths, "https://hg.example.org/bar", Some("bar")).unwrap();

        let sources = load_sources(&paths.sources_file()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].branches, vec!["default"]);
        assert_eq!(sources[0].bookmarks, vec!["@"]);
        assert_eq!(sources[0].workdir, PathBuf::from("ssh-example.com-foo-baz"));
        assert_eq!(sources[1].name(), "bar");

        cmd_list(&paths, OutputFormat::Table).unwrap();
        cmd_list(&paths, OutputFormat::Json).unwrap();
    }

    #[test]
    fn test_add_rejects_duplicate() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());

        add(&paths, "ssh://example.com/foo/baz", None).unwrap();
        assert!(add(&paths, "ssh://example.com/foo/baz", None).is_err());
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());

        add(&paths, "ssh://example.com/foo/baz", Some("baz")).unwrap();
        cmd_remove(&paths, "baz").unwrap();
        assert!(load_sources(&paths.sources_file()).unwrap().is_empty());
        assert!(cmd_remove(&paths, "baz").is_err());
    }

    #[test]
    fn test_reset_clears_pointers() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        add(&paths, "ssh://example.com/foo/baz", Some("baz")).unwrap();

        let source = sources(&paths, Some("baz")).unwrap().remove(0);
        let store = revision_store(&paths, &source);
        store.set("default", &RevisionPointer::new("5")).unwrap();
        store.set("@", &RevisionPointer::new("6")).unwrap();

        cmd_reset(&paths, "baz", Some("default")).unwrap();
        assert_eq!(store.get("default").unwrap(), None);
        assert_eq!(store.get("@").unwrap(), Some(RevisionPointer::new("6")));

        assert!(cmd_reset(&paths, "baz", Some("stable")).is_err());

        cmd_reset(&paths, "baz", None).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_status_and_changes_empty() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());

        cmd_status(&paths, None).unwrap();
        cmd_changes(&paths, None, 10, OutputFormat::Table).unwrap();
        assert!(cmd_status(&paths, Some("missing")).is_err());
    }

    #[test]
    fn test_recent_changes_filters_and_limits() {
        let dir = tempdir().unwrap();
        let log = JsonlChangeLog::open(dir.path().join("changes.jsonl")).unwrap();
        let changes = [
            ("a", "default", "1"),
            ("b", "default", "2"),
            ("a", "default", "3"),
            ("a", "stable", "4"),
            ("a", "default", "5"),
        ];
        for (repo, branch, rev) in changes {
            let change = NewChange {
                revision: rev.to_string(),
                author: "me".to_string(),
                description: "msg".to_string(),
                files: vec![],
                branch: branch.to_string(),
                timestamp: None,
                repository: repo.to_string(),
                project: None,
                category: None,
                src: "hg".to_string(),
            };
            log.add_change(change).unwrap();
        }

        // Same repository as another source polling "stable".
        let source = PollerConfig::new("a", PathBuf::new());
        let recent = recent_changes(log.list().unwrap(), Some(&source), 2);
        let revisions: Vec<_> = recent.iter().map(|r| r.change.revision.as_str()).collect();
        assert_eq!(revisions, vec!["3", "5"]);
        assert_eq!(recent[1].id, ChangeId(5));

        let stable = PollerConfig::new("a", PathBuf::new()).with_branches(["stable"]);
        let recent = recent_changes(log.list().unwrap(), Some(&stable), 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].change.revision, "4");

        assert_eq!(recent_changes(log.list().unwrap(), None, 10).len(), 5);
    }

    #[test]
    fn test_reset_refused_while_source_in_use() {
        let dir = tempdir().unwrap();
        let paths = Paths::new(dir.path());
        add(&paths, "ssh://example.com/foo/baz", Some("baz")).unwrap();

        let source = sources(&paths, Some("baz")).unwrap().remove(0);
        let held = lock_source(&paths, &source).unwrap();
        let err = cmd_reset(&paths, "baz", None).unwrap_err();
        assert!(err.to_string().contains("in use by another hgpoller process"));

        drop(held);
        cmd_reset(&paths, "baz", None).unwrap();
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hi", 2), "hi");
    }
}
