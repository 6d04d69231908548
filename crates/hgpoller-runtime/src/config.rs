//! Runtime configuration.

use std::time::Duration;

/// Configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Capacity of the event channel; slow subscribers miss older events.
    pub event_capacity: usize,
    /// Replaces every source's own poll interval when set.
    pub interval_override: Option<Duration>,
    /// Forces a first poll at start for every source.
    pub poll_at_launch: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            interval_override: None,
            poll_at_launch: false,
        }
    }
}

impl RuntimeConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Polls every source at this interval.
    pub fn with_interval_override(mut self, interval: Duration) -> Self {
        self.interval_override = Some(interval);
        self
    }

    /// Polls every source once at start.
    pub fn with_poll_at_launch(mut self, enabled: bool) -> Self {
        self.poll_at_launch = enabled;
        self
    }
}
