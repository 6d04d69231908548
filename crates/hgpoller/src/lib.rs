//! hgpoller CLI library.
//!
//! This crate provides the command-line interface for hgpoller: managing the
//! polled repositories, running one-off polls or the scheduler, and
//! inspecting recorded heads and changes.

pub mod cli;
pub mod commands;
