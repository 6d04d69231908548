//! Core data models for hgpoller.
//!
//! This crate provides the plain data types shared by every hgpoller crate:
//! revision pointers, parsed commit records and the change records handed to
//! a change sink.

pub mod change;
pub mod ids;
pub mod revision;

// Re-export main types
pub use change::{ChangeRecord, CommitKey, NewChange, CHANGE_SOURCE};
pub use ids::{ChangeId, SourceId};
pub use revision::{CommitRecord, RevisionPointer};
