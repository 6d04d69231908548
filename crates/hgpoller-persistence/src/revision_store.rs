//! Last confirmed head revision per branch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use hgpoller_models::RevisionPointer;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::atomic::{atomic_write_json, read_json_optional};
use crate::error::Result;

/// Storage for per-branch revision pointers of one source.
///
/// `set` and `clear` are single atomic writes: a reader sees either the
/// previous pointer or the new one. Only the latest value is kept.
pub trait RevisionStateStore: Send + Sync {
    /// Returns the pointer of `branch`, if one was ever set.
    fn get(&self, branch: &str) -> Result<Option<RevisionPointer>>;

    /// Replaces the pointer of `branch`.
    fn set(&self, branch: &str, pointer: &RevisionPointer) -> Result<()>;

    /// Forgets the pointer of `branch`, so the next poll starts a new baseline.
    fn clear(&self, branch: &str) -> Result<()>;

    /// Returns every stored pointer keyed by branch.
    fn list(&self) -> Result<BTreeMap<String, RevisionPointer>>;
}

/// On-disk layout of a revision file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RevisionFile {
    #[serde(default)]
    branches: BTreeMap<String, RevisionPointer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Revision pointers stored as one JSON file per source.
///
/// ```text
/// state/revisions/
/// └── ssh-example.com-foo-baz.json
/// ```
#[derive(Debug)]
pub struct JsonRevisionStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonRevisionStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<RevisionFile> {
        Ok(read_json_optional(&self.path)?.unwrap_or_default())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, RevisionPointer>)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = self.load()?;
        apply(&mut file.branches);
        file.updated_at = Some(Utc::now());
        atomic_write_json(&self.path, &file)
    }
}

impl RevisionStateStore for JsonRevisionStore {
    fn get(&self, branch: &str) -> Result<Option<RevisionPointer>> {
        Ok(self.load()?.branches.remove(branch))
    }

    fn set(&self, branch: &str, pointer: &RevisionPointer) -> Result<()> {
        debug!(path = %self.path.display(), branch = %branch, pointer = %pointer, "saving revision pointer");
        self.update(|branches| {
            branches.insert(branch.to_string(), pointer.clone());
        })
    }

    fn clear(&self, branch: &str) -> Result<()> {
        debug!(path = %self.path.display(), branch = %branch, "clearing revision pointer");
        self.update(|branches| {
            branches.remove(branch);
        })
    }

    fn list(&self) -> Result<BTreeMap<String, RevisionPointer>> {
        Ok(self.load()?.branches)
    }
}
