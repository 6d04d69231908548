//! Revision pointers and parsed commit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Last confirmed head of a branch.
///
/// `revision` is the opaque id handed back to `hg log -r`. `ordinal` is the
/// repository-local revision number of that head when it is known; the heads
/// listing reports ordinals, so it is what lets a poll recognise that the
/// current head is the one already recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPointer {
    /// Opaque revision id (usually a node hash).
    pub revision: String,

    /// Revision number of the same head, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u64>,
}

impl RevisionPointer {
    /// Creates a pointer from a revision string.
    ///
    /// A purely numeric revision is its own ordinal.
    pub fn new(revision: impl Into<String>) -> Self {
        let revision = revision.into();
        let ordinal = revision.parse().ok();
        Self { revision, ordinal }
    }

    /// Creates a pointer with an explicit ordinal.
    pub fn with_ordinal(revision: impl Into<String>, ordinal: u64) -> Self {
        Self {
            revision: revision.into(),
            ordinal: Some(ordinal),
        }
    }

    /// Returns true if `head`, as reported by a heads listing, is this pointer.
    pub fn matches_head(&self, head: &str) -> bool {
        if head == self.revision {
            return true;
        }
        match (self.ordinal, head.parse::<u64>()) {
            (Some(ordinal), Ok(head)) => ordinal == head,
            _ => false,
        }
    }

    /// Returns true if a range entry is this pointer or lies before it.
    pub fn covers(&self, ordinal: u64, node: &str) -> bool {
        node == self.revision || self.ordinal.is_some_and(|own| ordinal <= own)
    }
}

impl fmt::Display for RevisionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(ordinal) if ordinal.to_string() != self.revision => {
                write!(f, "{} (rev {})", self.revision, ordinal)
            }
            _ => f.write_str(&self.revision),
        }
    }
}

/// One commit, as decoded from a detail query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Revision id (node).
    pub revision: String,

    /// Revision number, only used to order a range.
    #[serde(skip)]
    pub ordinal: Option<u64>,

    /// Raw author line.
    pub author: String,

    /// Commit message with surrounding whitespace stripped.
    pub description: String,

    /// Changed files in the order the VCS reported them.
    pub files: Vec<String>,

    /// Commit time, present only when timestamp recording is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}
