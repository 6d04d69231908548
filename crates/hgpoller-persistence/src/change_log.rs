//! Append-only change log.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use hgpoller_models::{ChangeId, ChangeRecord, CommitKey, NewChange};
use tracing::{debug, warn};

use crate::atomic::ensure_dir;
use crate::error::{PersistenceError, Result};
use crate::lock::LockFile;

/// How long an append waits for another process to finish its own.
const APPEND_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Durable destination of emitted changes.
///
/// A successful return means the change is stored. Adding a change whose
/// commit is already stored returns the existing id instead of a duplicate.
pub trait ChangeSink: Send + Sync {
    /// Stores a change and returns its id.
    fn add_change(&self, change: NewChange) -> Result<ChangeId>;
}

/// Changes stored one JSON object per line.
///
/// Several handles, in one process or several, may share a file. Appends
/// are serialized by a lock file next to the log and first read whatever
/// other handles appended, so ids stay unique and a commit is stored once.
/// Each append is fsynced before `add_change` returns. A torn last line left
/// by a crash is skipped.
pub struct JsonlChangeLog {
    path: PathBuf,
    lock_path: PathBuf,
    inner: Mutex<LogState>,
}

struct LogState {
    file: File,
    /// Bytes of the file already read into `index`.
    offset: u64,
    /// Lines read so far, for diagnostics.
    lines: usize,
    index: HashMap<CommitKey, ChangeId>,
    next_id: ChangeId,
}

impl JsonlChangeLog {
    /// Opens the log at `path`, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| PersistenceError::WriteError {
                path: path.clone(),
                source,
            })?;

        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");

        let log = Self {
            lock_path: PathBuf::from(lock_path),
            inner: Mutex::new(LogState {
                file,
                offset: 0,
                lines: 0,
                index: HashMap::new(),
                next_id: ChangeId(1),
            }),
            path,
        };

        {
            let mut state = log.state();
            log.catch_up(&mut state)?;
            debug!(path = %log.path.display(), records = state.index.len(), "opened change log");
        }
        Ok(log)
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every stored change from disk, oldest first.
    pub fn list(&self) -> Result<Vec<ChangeRecord>> {
        let bytes = fs::read(&self.path).map_err(|source| PersistenceError::ReadError {
            path: self.path.clone(),
            source,
        })?;
        Ok(bytes
            .split(|b| *b == b'\n')
            .enumerate()
            .filter_map(|(index, line)| self.parse_line(line, index + 1))
            .collect())
    }

    /// Number of distinct changes this handle has seen.
    pub fn len(&self) -> usize {
        self.state().index.len()
    }

    /// Returns true if this handle has seen no change.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Indexes complete lines appended since the last call. Returns the
    /// trailing bytes not yet terminated by a newline.
    fn catch_up(&self, state: &mut LogState) -> Result<Vec<u8>> {
        let read_err = |source: io::Error| PersistenceError::ReadError {
            path: self.path.clone(),
            source,
        };

        state.file.seek(SeekFrom::Start(state.offset)).map_err(read_err)?;
        let mut tail = Vec::new();
        state.file.read_to_end(&mut tail).map_err(read_err)?;

        let mut consumed = 0;
        for line in tail.split_inclusive(|b| *b == b'\n') {
            if !line.ends_with(b"\n") {
                break;
            }
            consumed += line.len();
            state.lines += 1;
            if let Some(record) = self.parse_line(line, state.lines) {
                state.remember(&record);
            }
        }

        state.offset += consumed as u64;
        Ok(tail.split_off(consumed))
    }

    /// Terminates a line left unfinished by a crashed writer. Only called
    /// while holding the append lock, when no writer can be mid-line.
    fn seal_torn_line(&self, state: &mut LogState, torn: &[u8]) -> Result<()> {
        let write_err = |source: io::Error| PersistenceError::WriteError {
            path: self.path.clone(),
            source,
        };

        state.lines += 1;
        if let Some(record) = self.parse_line(torn, state.lines) {
            state.remember(&record);
        }
        state.file.write_all(b"\n").map_err(write_err)?;
        state.file.sync_data().map_err(write_err)?;
        state.offset += torn.len() as u64 + 1;
        Ok(())
    }

    fn parse_line(&self, line: &[u8], number: usize) -> Option<ChangeRecord> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        match serde_json::from_slice::<ChangeRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %self.path.display(), line = number, error = %e, "skipping unreadable change record");
                None
            }
        }
    }
}

impl LogState {
    fn remember(&mut self, record: &ChangeRecord) {
        if record.id >= self.next_id {
            self.next_id = record.id.next();
        }
        self.index
            .entry(record.change.commit_key())
            .or_insert(record.id);
    }
}

impl ChangeSink for JsonlChangeLog {
    fn add_change(&self, change: NewChange) -> Result<ChangeId> {
        let mut state = self.state();
        let _lock = LockFile::acquire_within(&self.lock_path, APPEND_LOCK_TIMEOUT)?;

        let torn = self.catch_up(&mut state)?;
        if !torn.is_empty() {
            self.seal_torn_line(&mut state, &torn)?;
        }

        let key = change.commit_key();
        if let Some(&existing) = state.index.get(&key) {
            debug!(
                change_id = %existing,
                revision = %change.revision,
                "change already recorded"
            );
            return Ok(existing);
        }

        let record = ChangeRecord {
            id: state.next_id,
            change,
            recorded_at: Utc::now(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let write_err = |source: io::Error| PersistenceError::WriteError {
            path: self.path.clone(),
            source,
        };
        state.file.write_all(&line).map_err(write_err)?;
        state.file.sync_data().map_err(write_err)?;

        state.offset += line.len() as u64;
        state.lines += 1;
        state.remember(&record);
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgpoller_models::CHANGE_SOURCE;
    use tempfile::tempdir;

    fn change(revision: &str, branch: &str) -> NewChange {
        NewChange {
            revision: revision.to_string(),
            author: "Joe Test <joetest@example.org>".to_string(),
            description: format!("Comment for {}", revision),
            files: vec!["file1".to_string()],
            branch: branch.to_string(),
            timestamp: None,
            repository: "ssh://example.com/foo/baz".to_string(),
            project: None,
            category: None,
            src: CHANGE_SOURCE.to_string(),
        }
    }

    #[test]
    fn test_assigns_increasing_ids() {
        let dir = tempdir().unwrap();
        let log = JsonlChangeLog::open(dir.path().join("changes.jsonl")).unwrap();

        assert_eq!(log.add_change(change("aaa", "default")).unwrap(), ChangeId(1));
        assert_eq!(log.add_change(change("bbb", "default")).unwrap(), ChangeId(2));

        let records = log.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].change.revision, "aaa");
        assert_eq!(records[1].change.revision, "bbb");
    }

    #[test]
    fn test_duplicate_commit_returns_existing_id() {
        let dir = tempdir().unwrap();
        let log = JsonlChangeLog::open(dir.path().join("changes.jsonl")).unwrap();

        let first = log.add_change(change("aaa", "default")).unwrap();
        let again = log.add_change(change("aaa", "default")).unwrap();
        let other_branch = log.add_change(change("aaa", "stable")).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other_branch);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_reopen_continues_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/changes.jsonl");

        {
            let log = JsonlChangeLog::open(&path).unwrap();
            log.add_change(change("aaa", "default")).unwrap();
            log.add_change(change("bbb", "default")).unwrap();
        }

        let log = JsonlChangeLog::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.add_change(change("bbb", "default")).unwrap(), ChangeId(2));
        assert_eq!(log.add_change(change("ccc", "default")).unwrap(), ChangeId(3));
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("changes.jsonl");

        {
            let log = JsonlChangeLog::open(&path).unwrap();
            log.add_change(change("aaa", "default")).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":2,\"revis").unwrap();
        drop(file);

        let log = JsonlChangeLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.add_change(change("bbb", "default")).unwrap(), ChangeId(2));

        let reopened = JsonlChangeLog::open(&path).unwrap();
        let revisions: Vec<_> = reopened
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.change.revision)
            .collect();
        assert_eq!(revisions, vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_handles_sharing_a_file_agree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("changes.jsonl");
        let first = JsonlChangeLog::open(&path).unwrap();
        let second = JsonlChangeLog::open(&path).unwrap();

        assert_eq!(first.add_change(change("784bd", "default")).unwrap(), ChangeId(1));
        assert_eq!(second.add_change(change("784bd", "default")).unwrap(), ChangeId(1));
        assert_eq!(second.add_change(change("999", "default")).unwrap(), ChangeId(2));
        assert_eq!(first.add_change(change("aaa", "default")).unwrap(), ChangeId(3));

        let stored: Vec<_> = first
            .list()
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.change.revision))
            .collect();
        assert_eq!(
            stored,
            vec![
                (ChangeId(1), "784bd".to_string()),
                (ChangeId(2), "999".to_string()),
                (ChangeId(3), "aaa".to_string()),
            ]
        );
        assert!(!path.with_file_name("changes.jsonl.lock").exists());
    }

    #[test]
    fn test_append_waits_for_held_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("changes.jsonl");
        let log = JsonlChangeLog::open(&path).unwrap();

        let lock = LockFile::acquire(dir.path().join("changes.jsonl.lock")).unwrap();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(lock);
        });

        assert_eq!(log.add_change(change("aaa", "default")).unwrap(), ChangeId(1));
        releaser.join().unwrap();
    }
}
