//! Exclusive lock files shared between hgpoller processes.
//!
//! A lock is a file created with `create_new`, holding the owner's pid. It is
//! removed when the [`LockFile`] is dropped. A lock whose owner no longer
//! runs is taken over.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::atomic::ensure_dir;
use crate::error::{PersistenceError, Result};

const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockMeta {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// A held lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    meta: LockMeta,
    released: bool,
}

enum Holder {
    Gone,
    Unreadable,
    Process(LockMeta),
}

impl LockFile {
    /// Takes the lock at `path`, failing with [`PersistenceError::Locked`]
    /// if another live holder has it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }

        let meta = LockMeta::current();
        let mut holder_pid = None;
        // A second attempt follows the removal of a stale or vanished lock.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write_meta(&mut file, &meta).map_err(|source| {
                        let _ = fs::remove_file(&path);
                        PersistenceError::WriteError {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    debug!(path = %path.display(), "lock acquired");
                    return Ok(Self {
                        path,
                        meta,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match read_holder(&path) {
                    Holder::Gone => continue,
                    Holder::Process(held) if !holder_alive(held.pid) => {
                        warn!(path = %path.display(), pid = held.pid, "removing stale lock");
                        remove_if_present(&path)?;
                    }
                    Holder::Process(held) => {
                        holder_pid = Some(held.pid);
                        break;
                    }
                    Holder::Unreadable => break,
                },
                Err(source) => return Err(PersistenceError::WriteError { path, source }),
            }
        }

        Err(PersistenceError::Locked {
            path,
            pid: holder_pid,
        })
    }

    /// Like [`LockFile::acquire`], retrying while the lock is held for up to
    /// `timeout`.
    pub fn acquire_within(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let path = path.into();
        let deadline = Instant::now() + timeout;
        loop {
            match Self::acquire(path.clone()) {
                Err(PersistenceError::Locked { .. }) if Instant::now() < deadline => {
                    thread::sleep(RETRY_DELAY);
                }
                other => return other,
            }
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Holder information written to the lock file.
    pub fn meta(&self) -> &LockMeta {
        &self.meta
    }

    /// Releases the lock, reporting a failure to remove the file.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_if_present(&self.path)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn write_meta(file: &mut fs::File, meta: &LockMeta) -> io::Result<()> {
    let bytes = serde_json::to_vec(meta).map_err(io::Error::other)?;
    file.write_all(&bytes)?;
    file.sync_all()
}

fn read_holder(path: &Path) -> Holder {
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<LockMeta>(&bytes) {
            Ok(meta) => Holder::Process(meta),
            // Empty while its creator is still writing.
            Err(_) => Holder::Unreadable,
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Holder::Gone,
        Err(_) => Holder::Unreadable,
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError::WriteError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Whether `pid` may still own a lock. Without `/proc` every holder is
/// assumed alive.
fn holder_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let proc_root = Path::new("/proc");
    if !proc_root.join("self").exists() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("locks/source.lock");

        let lock = LockFile::acquire(&path).unwrap();
        assert_eq!(lock.meta().pid, std::process::id());
        assert!(path.exists());

        match LockFile::acquire(&path) {
            Err(PersistenceError::Locked { pid, .. }) => {
                assert_eq!(pid, Some(std::process::id()))
            }
            other => panic!("expected Locked, got {:?}", other),
        }

        drop(lock);
        assert!(!path.exists());
        LockFile::acquire(&path).unwrap().release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_acquire_within_waits_for_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.lock");

        let lock = LockFile::acquire(&path).unwrap();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            drop(lock);
        });

        LockFile::acquire_within(&path, Duration::from_secs(5)).unwrap();
        releaser.join().unwrap();
    }

    #[test]
    fn test_acquire_within_times_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.lock");

        let _lock = LockFile::acquire(&path).unwrap();
        assert!(matches!(
            LockFile::acquire_within(&path, Duration::from_millis(30)),
            Err(PersistenceError::Locked { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_stale_lock_is_taken_over() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("source.lock");
        let stale = LockMeta {
            pid: 999_999_999,
            acquired_at: Utc::now(),
        };
        fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();

        let lock = LockFile::acquire(&path).unwrap();
        let on_disk: LockMeta = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(&on_disk, lock.meta());
    }
}
