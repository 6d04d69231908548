//! Scheduler for hgpoller.
//!
//! This crate runs poll cycles on a timer:
//! - `SourceSlot` - one source's engine behind its in-flight guard
//! - `SourcePoller` - the interval loop of one source
//! - `Runtime` - main entry point owning every source loop
//!
//! # Example
//!
//! ```ignore
//! use hgpoller_runtime::{Runtime, RuntimeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut runtime = Runtime::new(RuntimeConfig::default());
//!     runtime.add_source(engine)?;
//!
//!     // Subscribe to events
//!     let mut events = runtime.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     runtime.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Key Concepts
//!
//! ## In-flight guard
//!
//! Each source's engine sits behind a `tokio::sync::Mutex` that is only ever
//! taken with `try_lock`. A tick, or an on-demand poll, that finds it held is
//! skipped rather than queued, so at most one cycle per source runs at a time.
//!
//! ## Shutdown
//!
//! A `watch` channel tells every loop to stop. A cycle already running is
//! allowed to finish; its pointer updates are never cut in half.

pub mod config;
pub mod error;
pub mod event;
pub mod poller;
pub mod runtime;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use event::PollEvent;
pub use poller::{SourcePoller, SourceSlot};
pub use runtime::Runtime;
