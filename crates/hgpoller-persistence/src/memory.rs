//! In-memory stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use hgpoller_models::{ChangeId, ChangeRecord, CommitKey, NewChange, RevisionPointer};

use crate::change_log::ChangeSink;
use crate::error::Result;
use crate::revision_store::RevisionStateStore;

/// Revision pointers kept in memory.
#[derive(Debug, Default)]
pub struct MemoryRevisionStore {
    branches: Mutex<BTreeMap<String, RevisionPointer>>,
}

impl MemoryRevisionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn branches(&self) -> MutexGuard<'_, BTreeMap<String, RevisionPointer>> {
        self.branches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RevisionStateStore for MemoryRevisionStore {
    fn get(&self, branch: &str) -> Result<Option<RevisionPointer>> {
        Ok(self.branches().get(branch).cloned())
    }

    fn set(&self, branch: &str, pointer: &RevisionPointer) -> Result<()> {
        self.branches().insert(branch.to_string(), pointer.clone());
        Ok(())
    }

    fn clear(&self, branch: &str) -> Result<()> {
        self.branches().remove(branch);
        Ok(())
    }

    fn list(&self) -> Result<BTreeMap<String, RevisionPointer>> {
        Ok(self.branches().clone())
    }
}

/// Changes kept in memory.
#[derive(Debug, Default)]
pub struct MemoryChangeSink {
    inner: Mutex<MemoryLog>,
}

#[derive(Debug, Default)]
struct MemoryLog {
    records: Vec<ChangeRecord>,
    index: HashMap<CommitKey, ChangeId>,
}

impl MemoryChangeSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored change, oldest first.
    pub fn changes(&self) -> Vec<ChangeRecord> {
        self.log().records.clone()
    }

    /// Number of stored changes.
    pub fn len(&self) -> usize {
        self.log().records.len()
    }

    /// Returns true if no change is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn log(&self) -> MutexGuard<'_, MemoryLog> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ChangeSink for MemoryChangeSink {
    fn add_change(&self, change: NewChange) -> Result<ChangeId> {
        let mut log = self.log();
        let key = change.commit_key();
        if let Some(&existing) = log.index.get(&key) {
            return Ok(existing);
        }
        let id = ChangeId(log.records.len() as u64 + 1);
        log.index.insert(key, id);
        log.records.push(ChangeRecord {
            id,
            change,
            recorded_at: Utc::now(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgpoller_models::CHANGE_SOURCE;

    #[test]
    fn test_memory_store() {
        let store = MemoryRevisionStore::new();
        assert_eq!(store.get("default").unwrap(), None);

        store.set("default", &RevisionPointer::new("4")).unwrap();
        assert_eq!(store.get("default").unwrap(), Some(RevisionPointer::new("4")));
        assert_eq!(store.list().unwrap().len(), 1);

        store.clear("default").unwrap();
        assert_eq!(store.get("default").unwrap(), None);
    }

    #[test]
    fn test_memory_sink_dedupes() {
        let sink = MemoryChangeSink::new();
        let change = NewChange {
            revision: "784bd".to_string(),
            author: "Joe".to_string(),
            description: "msg".to_string(),
            files: Vec::new(),
            branch: "default".to_string(),
            timestamp: None,
            repository: "repo".to_string(),
            project: None,
            category: None,
            src: CHANGE_SOURCE.to_string(),
        };

        let first = sink.add_change(change.clone()).unwrap();
        let second = sink.add_change(change).unwrap();

        assert_eq!(first, ChangeId(1));
        assert_eq!(first, second);
        assert_eq!(sink.len(), 1);
    }
}
