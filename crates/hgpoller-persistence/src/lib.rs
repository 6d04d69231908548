//! Persistence layer for hgpoller.
//!
//! This crate provides the two pieces of durable state the poll engine
//! touches:
//! - `RevisionStateStore` - the last confirmed head per branch
//! - `ChangeSink` - the append-only log of emitted changes
//!
//! `LockFile` keeps separate hgpoller processes from working on the same
//! source, and serializes appends to the shared change log.
//!
//! File-backed implementations use atomic operations (write to a temp file,
//! then rename) for revision state and fsynced appends for the change log.
//! In-memory implementations exist for tests and embedding.
//!
//! # Example
//!
//! ```no_run
//! use hgpoller_models::RevisionPointer;
//! use hgpoller_persistence::{JsonRevisionStore, RevisionStateStore};
//!
//! let store = JsonRevisionStore::new("/home/user/.hgpoller/state/revisions/foo.json");
//!
//! store.set("default", &RevisionPointer::new("73591")).unwrap();
//! let pointer = store.get("default").unwrap();
//! ```

pub mod atomic;
pub mod change_log;
pub mod error;
pub mod lock;
pub mod memory;
pub mod revision_store;

pub use change_log::{ChangeSink, JsonlChangeLog};
pub use error::{PersistenceError, Result};
pub use lock::{LockFile, LockMeta};
pub use memory::{MemoryChangeSink, MemoryRevisionStore};
pub use revision_store::{JsonRevisionStore, RevisionStateStore};
