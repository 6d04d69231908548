//! Change records handed to a change sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ChangeId;
use crate::revision::CommitRecord;

/// Value of the `src` field on every change produced by the poller.
pub const CHANGE_SOURCE: &str = "hg";

/// A change about to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChange {
    /// Revision id (node) of the commit.
    pub revision: String,

    /// Raw author line.
    pub author: String,

    /// Commit message.
    pub description: String,

    /// Changed files.
    #[serde(default)]
    pub files: Vec<String>,

    /// Branch or bookmark the commit was found on.
    pub branch: String,

    /// Commit time, if timestamps are recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// URL of the polled repository.
    pub repository: String,

    /// Project label of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Category label of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Kind of change source.
    pub src: String,
}

impl NewChange {
    /// Creates a change from a parsed commit found on `branch`.
    pub fn from_commit(
        commit: &CommitRecord,
        branch: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            revision: commit.revision.clone(),
            author: commit.author.clone(),
            description: commit.description.clone(),
            files: commit.files.clone(),
            branch: branch.into(),
            timestamp: commit.timestamp,
            repository: repository.into(),
            project: None,
            category: None,
            src: CHANGE_SOURCE.to_string(),
        }
    }

    /// Sets the project label.
    pub fn with_project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }

    /// Sets the category label.
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }
}

/// Identity of a stored commit: one revision seen on one branch of one
/// repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitKey {
    pub repository: String,
    pub branch: String,
    pub revision: String,
}

impl NewChange {
    /// Returns the key sinks deduplicate on.
    pub fn commit_key(&self) -> CommitKey {
        CommitKey {
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            revision: self.revision.clone(),
        }
    }
}

/// A change as stored by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Id assigned by the sink.
    pub id: ChangeId,

    /// The change itself.
    #[serde(flatten)]
    pub change: NewChange,

    /// When the sink stored the change.
    pub recorded_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Returns true if this record stores the same commit of the same
    /// repository and branch as `change`.
    pub fn is_same_commit(&self, change: &NewChange) -> bool {
        self.change.commit_key() == change.commit_key()
    }
}
