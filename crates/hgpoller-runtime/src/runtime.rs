//! Main runtime manager.

use hgpoller_core::{PollEngine, PollReport};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::event::PollEvent;
use crate::poller::{SourcePoller, SourceSlot};

/// Runs the poll loops of every registered source.
pub struct Runtime {
    /// Runtime-wide settings.
    config: RuntimeConfig,
    /// Registered sources, in registration order.
    sources: Vec<SourceSlot>,
    /// Event channel shared by every poller.
    events: broadcast::Sender<PollEvent>,
    /// Handles to the poller tasks.
    poller_handles: Vec<JoinHandle<()>>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver (for cloning to pollers).
    shutdown_rx: watch::Receiver<bool>,
    /// Whether the runtime has been started.
    started: bool,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            sources: Vec::new(),
            events,
            poller_handles: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            started: false,
        }
    }

    /// Registers a source.
    ///
    /// Sources added after [`start`](Self::start) can be polled on demand but
    /// have no scheduled loop.
    pub fn add_source(&mut self, engine: PollEngine) -> Result<()> {
        let mut slot = SourceSlot::new(engine);
        if self.source(slot.name()).is_ok() {
            return Err(RuntimeError::SourceExists(slot.name().to_string()));
        }
        if let Some(interval) = self.config.interval_override {
            slot.set_interval(interval);
        }
        if self.config.poll_at_launch {
            slot.force_poll_at_launch();
        }
        debug!(source = %slot.name(), interval_secs = slot.interval().as_secs(), "source registered");
        self.sources.push(slot);
        Ok(())
    }

    /// Names of the registered sources.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(SourceSlot::name).collect()
    }

    fn source(&self, name: &str) -> Result<&SourceSlot> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| RuntimeError::SourceNotFound(name.to_string()))
    }

    /// Subscribes to poll events.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    /// Runs one cycle of `name` now, outside its schedule.
    ///
    /// Fails with [`RuntimeError::CycleInFlight`] if a cycle of that source
    /// is already running.
    pub async fn poll_now(&self, name: &str) -> Result<PollReport> {
        self.source(name)?.poll(&self.events).await
    }

    /// Runs one cycle of every source, one after the other.
    pub async fn poll_all(&self) -> Vec<(String, Result<PollReport>)> {
        let mut results = Vec::with_capacity(self.sources.len());
        for slot in &self.sources {
            results.push((slot.name().to_string(), slot.poll(&self.events).await));
        }
        results
    }

    /// Start the runtime (one poll loop per source).
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }

        info!(sources = self.sources.len(), "starting runtime");

        // A previous shutdown left the flag set.
        self.shutdown_tx.send_replace(false);

        for slot in &self.sources {
            let mut poller =
                SourcePoller::new(slot.clone(), self.events.clone(), self.shutdown_rx.clone());
            self.poller_handles.push(tokio::spawn(async move {
                poller.run().await;
            }));
        }

        self.started = true;

        debug!("runtime started");

        Ok(())
    }

    /// Stop the runtime gracefully, waiting for running cycles to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.started {
            return Err(RuntimeError::NotStarted);
        }

        info!("shutting down runtime");

        self.shutdown_tx.send(true).map_err(|e| {
            RuntimeError::Shutdown(format!("failed to send shutdown signal: {}", e))
        })?;

        for handle in self.poller_handles.drain(..) {
            handle
                .await
                .map_err(|e| RuntimeError::Shutdown(format!("poller task panicked: {}", e)))?;
        }

        self.started = false;

        info!("runtime stopped");

        Ok(())
    }

    /// Check if the runtime has been started.
    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Send shutdown signal if still running
        if self.started {
            let _ = self.shutdown_tx.send(true);
        }
    }
}
