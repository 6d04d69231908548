//! The poll cycle of one source.
//!
//! A cycle runs every command strictly in sequence:
//!
//! 1. `hg init` the working copy unless it already is a repository
//! 2. `hg pull` every configured branch and bookmark
//! 3. per branch: list heads, and if there is exactly one that moved,
//!    list the range since the recorded pointer, fetch the detail of every
//!    new revision, emit the changes oldest first, then move the pointer
//!
//! The pointer of a branch only moves after every change of its range was
//! accepted by the sink. Any failure before that leaves the pointer where it
//! was, so the next cycle recomputes the same range.

mod outcome;


pub use outcome::{BranchOutcome, BranchReport, PollReport};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hgpoller_exec::{CommandRunner, Environment};
use hgpoller_models::{ChangeId, CommitRecord, NewChange, RevisionPointer};
use hgpoller_persistence::{ChangeSink, RevisionStateStore};
use tracing::{debug, info, warn};

use crate::error::{ParseFailure, PollError, Result};
use crate::hg::HgCommands;
use crate::parser::{parse_detail, parse_heads, parse_range};
use crate::source::PollerConfig;

/// Polls one remote repository into a local working copy.
pub struct PollEngine {
    config: PollerConfig,
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn RevisionStateStore>,
    sink: Arc<dyn ChangeSink>,
    ready: bool,
}

impl PollEngine {
    /// Creates an engine for `config`.
    ///
    /// `config.workdir` is used as given; resolve it first if it may be
    /// relative.
    pub fn new(
        config: PollerConfig,
        runner: Arc<dyn CommandRunner>,
        store: Arc<dyn RevisionStateStore>,
        sink: Arc<dyn ChangeSink>,
    ) -> Self {
        Self {
            config,
            runner,
            store,
            sink,
            ready: false,
        }
    }

    /// Configuration of the polled source.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Display name of the polled source.
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Local working copy.
    pub fn workdir(&self) -> &Path {
        &self.config.workdir
    }

    /// See [`PollerConfig::describe`].
    pub fn describe(&self) -> String {
        self.config.describe()
    }

    /// Returns true once the working copy is known to be a repository.
    pub fn is_repository_ready(&self) -> bool {
        self.ready || self.hg_dir().is_dir()
    }

    /// Store holding the pointers of this source.
    pub fn store(&self) -> &Arc<dyn RevisionStateStore> {
        &self.store
    }

    fn hg_dir(&self) -> PathBuf {
        self.config.workdir.join(".hg")
    }

    /// Runs one poll cycle over every branch and bookmark.
    ///
    /// Fails only if the working copy cannot be initialized or the pull
    /// fails; per-branch failures are reported in the [`PollReport`].
    pub async fn poll(&mut self) -> Result<PollReport> {
        let hg = HgCommands::new(
            &self.config.hg_bin,
            &self.config.workdir,
            Environment::capture(),
        );

        self.ensure_repository(&hg).await?;

        let pull = hg.pull(
            &self.config.repo_url,
            self.config.branches.iter().map(String::as_str),
            self.config.bookmarks.iter().map(String::as_str),
        );
        if let Err(e) = self.runner.run(&pull).await {
            warn!(
                source = %self.config.name(),
                error = %e,
                "Pull failed, will retry next cycle"
            );
            return Err(e.into());
        }

        let mut report = PollReport::default();
        for branch in self.config.targets() {
            let result = self.poll_branch(&hg, branch).await;
            match &result {
                Ok(outcome) => debug!(
                    source = %self.config.name(),
                    branch = %branch,
                    outcome = %outcome,
                    "Branch polled"
                ),
                Err(e) => warn!(
                    source = %self.config.name(),
                    branch = %branch,
                    error = %e,
                    "Branch poll failed, pointer left unchanged"
                ),
            }
            report.branches.push(BranchReport {
                branch: branch.to_string(),
                result,
            });
        }

        Ok(report)
    }

    async fn ensure_repository(&mut self, hg: &HgCommands) -> Result<()> {
        if self.is_repository_ready() {
            self.ready = true;
            return Ok(());
        }

        info!(
            source = %self.config.name(),
            workdir = %self.config.workdir.display(),
            "Initializing working copy"
        );
        if let Err(e) = self.runner.run(&hg.init()).await {
            warn!(
                source = %self.config.name(),
                error = %e,
                "Working copy initialization failed"
            );
            return Err(e.into());
        }
        self.ready = true;
        Ok(())
    }

    async fn poll_branch(&self, hg: &HgCommands, branch: &str) -> Result<BranchOutcome> {
        let output = self.runner.run(&hg.heads(branch)).await?;
        let heads = match parse_heads(&output) {
            Ok(heads) => distinct(heads),
            Err(ParseFailure::NoHeads) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        if heads.len() != 1 {
            info!(
                source = %self.config.name(),
                branch = %branch,
                heads = ?heads,
                "Branch does not have exactly one head, not advancing"
            );
            return Ok(BranchOutcome::Ambiguous { heads });
        }
        let head = &heads[0];

        let current = match self.store.get(branch).map_err(PollError::Store)? {
            Some(current) => current,
            None => {
                let pointer = RevisionPointer::new(head.as_str());
                self.store
                    .set(branch, &pointer)
                    .map_err(PollError::Store)?;
                info!(
                    source = %self.config.name(),
                    branch = %branch,
                    pointer = %pointer,
                    "Baseline recorded"
                );
                return Ok(BranchOutcome::Initialized { pointer });
            }
        };

        if current.matches_head(head) {
            return Ok(BranchOutcome::Unchanged { pointer: current });
        }

        let commits = self.collect_commits(hg, &current, head).await?;
        let Some(newest) = commits.last() else {
            warn!(
                source = %self.config.name(),
                branch = %branch,
                pointer = %current,
                head = %head,
                "Head does not descend from the recorded pointer; reset the branch to resume"
            );
            return Ok(BranchOutcome::Diverged {
                pointer: current,
                head: head.clone(),
            });
        };
        let next = match newest.ordinal {
            Some(ordinal) => RevisionPointer::with_ordinal(newest.revision.as_str(), ordinal),
            None => RevisionPointer::new(newest.revision.as_str()),
        };

        let changes = self.emit(branch, &commits)?;
        self.store.set(branch, &next).map_err(PollError::Store)?;

        info!(
            source = %self.config.name(),
            branch = %branch,
            from = %current,
            to = %next,
            changes = changes.len(),
            "Branch advanced"
        );
        Ok(BranchOutcome::Advanced {
            from: current,
            to: next,
            changes,
        })
    }

    /// Fetches the commits after `current` up to `head`, oldest first.
    async fn collect_commits(
        &self,
        hg: &HgCommands,
        current: &RevisionPointer,
        head: &str,
    ) -> Result<Vec<CommitRecord>> {
        let output = self.runner.run(&hg.range(&current.revision, head)).await?;
        let mut entries = parse_range(&output)?;
        entries.sort_by_key(|(ordinal, _)| *ordinal);
        entries.retain(|(ordinal, node)| !current.covers(*ordinal, node));

        let mut commits = Vec::with_capacity(entries.len());
        for (ordinal, node) in entries {
            let output = self.runner.run(&hg.detail(&node)).await?;
            let detail = parse_detail(&output, self.config.use_timestamps)?;
            commits.push(detail.into_commit(node, Some(ordinal)));
        }
        Ok(commits)
    }

    fn emit(&self, branch: &str, commits: &[CommitRecord]) -> Result<Vec<ChangeId>> {
        let mut ids = Vec::with_capacity(commits.len());
        for commit in commits {
            let change = NewChange::from_commit(commit, branch, self.config.repo_url.as_str())
                .with_project(self.config.project.clone())
                .with_category(self.config.category.clone());
            let id = self.sink.add_change(change).map_err(PollError::Sink)?;
            debug!(
                source = %self.config.name(),
                branch = %branch,
                revision = %commit.revision,
                id = %id,
                "Change emitted"
            );
            ids.push(id);
        }
        Ok(ids)
    }
}

impl std::fmt::Debug for PollEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollEngine")
            .field("source", &self.config.name())
            .field("workdir", &self.config.workdir)
            .field("ready", &self.ready)
            .finish()
    }
}

/// Drops repeated heads, keeping the first occurrence.
fn distinct(heads: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(heads.len());
    for head in heads {
        if !unique.contains(&head) {
            unique.push(head);
        }
    }
    unique
}
