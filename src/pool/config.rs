//! Pool configuration

use crate::core::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_NAME: &str = "waiting-pool";
const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_ADMISSION_POLL: Duration = Duration::from_secs(2);
const DEFAULT_DRAIN_POLL: Duration = Duration::from_secs(1);
const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_WORKER_POLL: Duration = Duration::from_millis(100);

/// Configuration for a [`WaitingPool`](crate::pool::WaitingPool)
///
/// Every value is clamped rather than rejected: capacity and worker count are
/// at least 1, an empty name falls back to the default, and zero durations
/// fall back to their defaults.
///
/// The re-check intervals only bound how long a blocked thread sleeps between
/// looking at its condition; state changes wake waiters directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool name, used in log lines and as the worker thread name prefix
    pub name: String,
    /// Maximum number of queued, not yet running jobs
    pub capacity: usize,
    /// Number of worker threads
    pub workers: usize,
    /// Re-check interval of a producer waiting for queue space.
    /// Default: 2s
    pub admission_poll: Duration,
    /// Re-check interval while shutdown waits for the queue to empty.
    /// Default: 1s
    pub drain_poll: Duration,
    /// Length of one termination wait attempt during shutdown.
    /// Default: 10s
    pub termination_timeout: Duration,
    /// How long an idle worker waits for a job before re-checking for abort.
    /// Default: 100ms
    pub worker_poll: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            capacity: DEFAULT_CAPACITY,
            workers: DEFAULT_WORKERS,
            admission_poll: DEFAULT_ADMISSION_POLL,
            drain_poll: DEFAULT_DRAIN_POLL,
            termination_timeout: DEFAULT_TERMINATION_TIMEOUT,
            worker_poll: DEFAULT_WORKER_POLL,
        }
    }
}

impl PoolConfig {
    /// Create a configuration from the three construction parameters
    #[must_use]
    pub fn new<S: Into<String>>(name: S, capacity: usize, workers: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            workers,
            ..Default::default()
        }
        .normalized()
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    ///
    /// ```rust
    /// use waiting_pool::PoolConfig;
    ///
    /// let config = PoolConfig::from_json(r#"{"name": "isbn", "capacity": 0, "workers": 4}"#).unwrap();
    /// assert_eq!(config.name, "isbn");
    /// assert_eq!(config.capacity, 1);
    /// assert_eq!(config.workers, 4);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the input is not valid JSON for
    /// this structure.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str::<Self>(json)
            .map(Self::normalized)
            .map_err(|e| PoolError::invalid_config("json", e.to_string()))
    }

    /// Set queue capacity
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set worker count
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the producer re-check interval while waiting for space
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_admission_poll(mut self, interval: Duration) -> Self {
        self.admission_poll = non_zero_or(interval, DEFAULT_ADMISSION_POLL);
        self
    }

    /// Set the shutdown re-check interval while the queue drains
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_drain_poll(mut self, interval: Duration) -> Self {
        self.drain_poll = non_zero_or(interval, DEFAULT_DRAIN_POLL);
        self
    }

    /// Set the length of one termination wait attempt
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_termination_timeout(mut self, timeout: Duration) -> Self {
        self.termination_timeout = non_zero_or(timeout, DEFAULT_TERMINATION_TIMEOUT);
        self
    }

    /// Set the idle worker poll interval
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_worker_poll(mut self, interval: Duration) -> Self {
        self.worker_poll = non_zero_or(interval, DEFAULT_WORKER_POLL);
        self
    }

    /// Returns the configuration with every value clamped into range
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = DEFAULT_NAME.to_string();
        }
        self.capacity = self.capacity.max(1);
        self.workers = self.workers.max(1);
        self.admission_poll = non_zero_or(self.admission_poll, DEFAULT_ADMISSION_POLL);
        self.drain_poll = non_zero_or(self.drain_poll, DEFAULT_DRAIN_POLL);
        self.termination_timeout =
            non_zero_or(self.termination_timeout, DEFAULT_TERMINATION_TIMEOUT);
        self.worker_poll = non_zero_or(self.worker_poll, DEFAULT_WORKER_POLL);
        self
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps() {
        let config = PoolConfig::new("", 0, 0);
        assert_eq!(config.name, "waiting-pool");
        assert_eq!(config.capacity, 1);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.admission_poll, Duration::from_secs(2));
        assert_eq!(config.drain_poll, Duration::from_secs(1));
        assert_eq!(config.termination_timeout, Duration::from_secs(10));
        assert_eq!(config.worker_poll, Duration::from_millis(100));
    }

    #[test]
    fn test_builders() {
        let config = PoolConfig::new("marc", 8, 2)
            .with_capacity(0)
            .with_workers(3)
            .with_admission_poll(Duration::ZERO)
            .with_drain_poll(Duration::from_millis(5))
            .with_termination_timeout(Duration::from_millis(50))
            .with_worker_poll(Duration::from_millis(7));

        assert_eq!(config.capacity, 1);
        assert_eq!(config.workers, 3);
        assert_eq!(config.admission_poll, Duration::from_secs(2));
        assert_eq!(config.drain_poll, Duration::from_millis(5));
        assert_eq!(config.termination_timeout, Duration::from_millis(50));
        assert_eq!(config.worker_poll, Duration::from_millis(7));
    }

    #[test]
    fn test_json_roundtrip_keeps_values() {
        let config = PoolConfig::new("ppn", 16, 4).with_drain_poll(Duration::from_millis(250));
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(PoolConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_json_partial_and_invalid() {
        let config = PoolConfig::from_json(r#"{"workers": 0}"#).unwrap();
        assert_eq!(config.workers, 1);
        assert_eq!(config.capacity, 100);

        let err = PoolConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig { .. }));
    }
}
