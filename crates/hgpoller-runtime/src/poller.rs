//! Periodic polling of one source.

use std::sync::Arc;
use std::time::Duration;

use hgpoller_core::{PollEngine, PollReport};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::event::PollEvent;

/// A registered source: its engine behind the in-flight guard.
#[derive(Clone)]
pub struct SourceSlot {
    name: String,
    engine: Arc<Mutex<PollEngine>>,
    interval: Duration,
    poll_at_launch: bool,
}

impl SourceSlot {
    /// Wraps an engine, taking interval and launch policy from its config.
    pub fn new(engine: PollEngine) -> Self {
        let config = engine.config();
        Self {
            name: config.name().to_string(),
            interval: config.poll_interval,
            poll_at_launch: config.poll_at_launch,
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// Source name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time between scheduled cycles.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub(crate) fn force_poll_at_launch(&mut self) {
        self.poll_at_launch = true;
    }

    /// Runs one cycle unless one is already running.
    ///
    /// Events for the cycle are sent on `events`; having no subscriber is
    /// fine.
    pub async fn poll(&self, events: &broadcast::Sender<PollEvent>) -> Result<PollReport> {
        let Ok(mut engine) = self.engine.try_lock() else {
            debug!(source = %self.name, "previous cycle still running, skipping");
            let _ = events.send(PollEvent::CycleSkipped {
                source: self.name.clone(),
            });
            return Err(RuntimeError::CycleInFlight(self.name.clone()));
        };

        let _ = events.send(PollEvent::CycleStarted {
            source: self.name.clone(),
        });

        match engine.poll().await {
            Ok(report) => {
                for event in PollEvent::from_report(&self.name, &report) {
                    let _ = events.send(event);
                }
                if report.emitted() > 0 {
                    info!(source = %self.name, changes = report.emitted(), "Cycle emitted changes");
                }
                Ok(report)
            }
            Err(e) => {
                let _ = events.send(PollEvent::CycleFailed {
                    source: self.name.clone(),
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for SourceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSlot")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("poll_at_launch", &self.poll_at_launch)
            .finish()
    }
}

/// Polls one source on its interval until shutdown.
pub struct SourcePoller {
    slot: SourceSlot,
    events: broadcast::Sender<PollEvent>,
    shutdown: watch::Receiver<bool>,
}

impl SourcePoller {
    /// Creates a poller for `slot`.
    pub fn new(
        slot: SourceSlot,
        events: broadcast::Sender<PollEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            slot,
            events,
            shutdown,
        }
    }

    /// Run the polling loop until shutdown signal.
    pub async fn run(&mut self) {
        let period = self.slot.interval;
        let start = if self.slot.poll_at_launch {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            source = %self.slot.name,
            poll_interval_secs = period.as_secs(),
            poll_at_launch = self.slot.poll_at_launch,
            "starting source poller"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are already reported as events and retried next tick.
                    if let Err(e) = self.slot.poll(&self.events).await {
                        if !matches!(e, RuntimeError::CycleInFlight(_)) {
                            warn!(source = %self.slot.name, error = %e, "Cycle failed");
                        }
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!(source = %self.slot.name, "poller received shutdown signal");
                        break;
                    }
                }
            }
        }

        debug!(source = %self.slot.name, "source poller stopped");
    }
}
