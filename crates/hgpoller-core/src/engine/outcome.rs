//! Results of a poll cycle.

use std::fmt;

use hgpoller_models::{ChangeId, RevisionPointer};

use crate::error::PollError;

/// How a branch ended one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    /// First unambiguous poll: the pointer now names the head, nothing was
    /// emitted.
    Initialized { pointer: RevisionPointer },

    /// The branch has zero or several heads; nothing changed.
    Ambiguous { heads: Vec<String> },

    /// The head is the recorded pointer.
    Unchanged { pointer: RevisionPointer },

    /// New commits were emitted and the pointer moved.
    Advanced {
        from: RevisionPointer,
        to: RevisionPointer,
        changes: Vec<ChangeId>,
    },

    /// The head is not a descendant of the pointer (the recorded revision
    /// was stripped or rewritten); nothing changed.
    Diverged {
        pointer: RevisionPointer,
        head: String,
    },
}

impl BranchOutcome {
    /// Number of changes emitted.
    pub fn emitted(&self) -> usize {
        match self {
            BranchOutcome::Advanced { changes, .. } => changes.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for BranchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchOutcome::Initialized { pointer } => write!(f, "baseline set at {}", pointer),
            BranchOutcome::Ambiguous { heads } => {
                write!(f, "{} heads ({}), staying put", heads.len(), heads.join(", "))
            }
            BranchOutcome::Unchanged { pointer } => write!(f, "unchanged at {}", pointer),
            BranchOutcome::Advanced { from, to, changes } => {
                write!(f, "{} new change(s), {} -> {}", changes.len(), from, to)
            }
            BranchOutcome::Diverged { pointer, head } => {
                write!(f, "head {} does not descend from {}, staying put", head, pointer)
            }
        }
    }
}

/// Result of one branch.
#[derive(Debug)]
pub struct BranchReport {
    /// Branch or bookmark name.
    pub branch: String,
    /// What happened.
    pub result: Result<BranchOutcome, PollError>,
}

/// Result of one poll cycle over every branch of a source.
#[derive(Debug, Default)]
pub struct PollReport {
    /// Per-branch results, in polling order.
    pub branches: Vec<BranchReport>,
}

impl PollReport {
    /// Total number of changes emitted.
    pub fn emitted(&self) -> usize {
        self.branches
            .iter()
            .filter_map(|b| b.result.as_ref().ok())
            .map(BranchOutcome::emitted)
            .sum()
    }

    /// Returns the report of `branch`.
    pub fn branch(&self, branch: &str) -> Option<&BranchReport> {
        self.branches.iter().find(|b| b.branch == branch)
    }

    /// Returns true if no branch failed.
    pub fn is_success(&self) -> bool {
        self.branches.iter().all(|b| b.result.is_ok())
    }
}
