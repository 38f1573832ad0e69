//! Tracing integration for observability.
//!
//! With the `tracing` feature enabled, every worker runs inside a `worker` span
//! and every task inside a `task` span. The functions in [`metrics`] emit
//! events with `counter.*`, `gauge.*` and `histogram.*` fields that a
//! metrics-aware subscriber can aggregate.
//!
//! # Example
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//! use waiting_pool::WaitingPool;
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env().add_directive("waiting_pool=trace".parse()?))
//!     .init();
//!
//! let pool = WaitingPool::new("isbn-check", 16, 4)?;
//! pool.execute(|| Ok(()));
//! pool.shutdown();
//! ```

/// Metrics recording functions.
#[cfg(feature = "tracing")]
pub mod metrics {
    use std::time::Duration;

    /// Records the outcome of one admission attempt.
    #[inline]
    pub fn record_admission(admitted: bool, waited: Duration, queue_depth: usize) {
        let waited_ms = waited.as_millis() as u64;
        if admitted {
            tracing::trace!(
                counter.tasks_admitted = 1,
                histogram.admission_wait_ms = waited_ms,
                gauge.queue_depth = queue_depth as i64,
                "task admitted"
            );
        } else {
            tracing::trace!(
                counter.tasks_rejected = 1,
                histogram.admission_wait_ms = waited_ms,
                gauge.queue_depth = queue_depth as i64,
                "task rejected"
            );
        }
    }

    /// Records a transient enqueue failure that restarted admission.
    #[inline]
    pub fn record_retry() {
        tracing::trace!(counter.admission_retries = 1, "admission retried");
    }

    /// Records task completion with timing.
    #[inline]
    pub fn record_completion(duration: Duration, success: bool) {
        let duration_ms = duration.as_millis() as u64;
        if success {
            tracing::trace!(
                counter.tasks_completed = 1,
                histogram.task_duration_ms = duration_ms,
                "task completed"
            );
        } else {
            tracing::trace!(
                counter.tasks_failed = 1,
                histogram.task_duration_ms = duration_ms,
                "task failed"
            );
        }
    }

    /// Records a task panic.
    #[inline]
    pub fn record_panic(duration: Duration) {
        tracing::trace!(
            counter.tasks_panicked = 1,
            histogram.task_duration_ms = duration.as_millis() as u64,
            "task panicked"
        );
    }

    /// Records a worker picking up a task.
    #[inline]
    pub fn record_worker_busy(busy_workers: usize) {
        tracing::trace!(gauge.workers_busy = busy_workers as i64, "worker busy");
    }

    /// Records a worker finishing a task.
    #[inline]
    pub fn record_worker_idle(busy_workers: usize) {
        tracing::trace!(gauge.workers_busy = busy_workers as i64, "worker idle");
    }

    /// Records pool construction.
    #[inline]
    pub fn record_pool_start(pool_name: &str, workers: usize, capacity: usize) {
        tracing::info!(
            pool = pool_name,
            workers = workers,
            capacity = capacity,
            "waiting pool started"
        );
    }

    /// Records a completed graceful shutdown.
    #[inline]
    pub fn record_pool_shutdown(pool_name: &str, tasks_processed: u64, tasks_failed: u64) {
        tracing::info!(
            pool = pool_name,
            tasks_processed = tasks_processed,
            tasks_failed = tasks_failed,
            "waiting pool shutdown complete"
        );
    }

    /// Records a forced abort.
    #[inline]
    pub fn record_abort(pool_name: &str, discarded: usize) {
        tracing::warn!(
            pool = pool_name,
            counter.tasks_discarded = discarded as u64,
            "waiting pool aborted"
        );
    }
}
