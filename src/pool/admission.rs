//! Admission gate: blocks producers until the queue has room

use crate::core::{BoxedJob, CancellationToken};
use crate::pool::state::{ExecutorState, StateCell};
use crate::queue::{JobQueue, QueueError};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why an admission attempt ended without enqueueing the task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// The pool left `Running` before the task was enqueued
    NotRunning(ExecutorState),
    /// The caller's token was cancelled while waiting for space
    Cancelled,
    /// The queue refused the task and did not hand it back
    Lost,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotRunning(state) => write!(f, "pool is {}", state),
            Rejection::Cancelled => write!(f, "cancelled while waiting for queue space"),
            Rejection::Lost => write!(f, "queue did not return the refused task"),
        }
    }
}

/// Counters of the admission gate
#[derive(Debug, Default)]
pub struct AdmissionStats {
    admitted: AtomicU64,
    rejected: AtomicU64,
    cancelled: AtomicU64,
    retried: AtomicU64,
    waited: AtomicU64,
}

impl AdmissionStats {
    /// Tasks enqueued
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Tasks refused because the pool was not running
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Admissions abandoned because the caller cancelled
    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Transient enqueue failures that restarted an admission
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    /// Admissions that had to wait for queue space at least once
    pub fn waited(&self) -> u64 {
        self.waited.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> AdmissionStatSnapshot {
        AdmissionStatSnapshot {
            admitted: self.admitted(),
            rejected: self.rejected(),
            cancelled: self.cancelled(),
            retried: self.retried(),
            waited: self.waited(),
        }
    }
}

/// Serializable copy of [`AdmissionStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionStatSnapshot {
    /// Tasks enqueued
    pub admitted: u64,
    /// Tasks refused because the pool was not running
    pub rejected: u64,
    /// Admissions abandoned because the caller cancelled
    pub cancelled: u64,
    /// Transient enqueue failures that restarted an admission
    pub retried: u64,
    /// Admissions that had to wait for queue space
    pub waited: u64,
}

/// Serializes producers and makes them wait for queue space
///
/// One mutex covers the whole admission attempt including its wait, so at
/// most one producer is ever between the capacity check and the enqueue.
pub(crate) struct AdmissionGate {
    pool_name: String,
    lock: Mutex<()>,
    queue: Arc<dyn JobQueue>,
    state: Arc<StateCell>,
    poll: Duration,
    stats: AdmissionStats,
}

impl AdmissionGate {
    pub(crate) fn new(
        pool_name: impl Into<String>,
        queue: Arc<dyn JobQueue>,
        state: Arc<StateCell>,
        poll: Duration,
    ) -> Self {
        Self {
            pool_name: pool_name.into(),
            lock: Mutex::new(()),
            queue,
            state,
            poll,
            stats: AdmissionStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> &AdmissionStats {
        &self.stats
    }

    /// Enqueues `job`, blocking while the queue is full
    ///
    /// Gives up when the pool leaves `Running` or `cancel` fires. A refused
    /// job is dropped here, which abandons any result handle attached to it.
    pub(crate) fn admit(&self, job: BoxedJob, cancel: &CancellationToken) -> Result<(), Rejection> {
        let job_type = job.job_type().to_string();
        let start = Instant::now();

        let outcome = {
            let _admission = self.lock.lock();

            let queue = Arc::clone(&self.queue);
            let _wake = cancel.on_cancel(move || queue.wake_waiters());

            self.admit_locked(job, cancel)
        };

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_admission(
            outcome.is_ok(),
            start.elapsed(),
            self.queue.len(),
        );

        match outcome {
            Ok(()) => {
                self.stats.admitted.fetch_add(1, Ordering::Relaxed);
                log::trace!(
                    "{}: admitted '{}' after {:?}",
                    self.pool_name,
                    job_type,
                    start.elapsed()
                );
            }
            Err(rejection) => {
                let counter = match rejection {
                    Rejection::Cancelled => &self.stats.cancelled,
                    _ => &self.stats.rejected,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "{}: task '{}' dropped: {}",
                    self.pool_name,
                    job_type,
                    rejection
                );
            }
        }
        outcome
    }

    fn admit_locked(&self, mut job: BoxedJob, cancel: &CancellationToken) -> Result<(), Rejection> {
        let interrupted = || cancel.is_cancelled() || self.state.load() != ExecutorState::Running;
        let mut counted_wait = false;

        loop {
            let state = self.state.load();
            if state != ExecutorState::Running {
                return Err(Rejection::NotRunning(state));
            }

            while !self.queue.wait_for_space(self.poll, &interrupted) {
                if cancel.is_cancelled() {
                    return Err(Rejection::Cancelled);
                }
                let state = self.state.load();
                if state != ExecutorState::Running {
                    return Err(Rejection::NotRunning(state));
                }
                if !counted_wait {
                    counted_wait = true;
                    self.stats.waited.fetch_add(1, Ordering::Relaxed);
                }
                log::trace!(
                    "{}: queue full ({}/{}), waiting for space",
                    self.pool_name,
                    self.queue.len(),
                    self.queue.capacity()
                );
            }

            match self.queue.try_send(job) {
                Ok(()) => return Ok(()),
                Err(QueueError::Closed(_)) => {
                    return Err(Rejection::NotRunning(self.state.load()));
                }
                Err(QueueError::Full(holder)) | Err(QueueError::Rejected(holder)) => {
                    log::warn!(
                        "{}: enqueue failed after capacity check, retrying admission",
                        self.pool_name
                    );
                    self.stats.retried.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "tracing")]
                    crate::tracing::metrics::record_retry();

                    job = holder.take().ok_or(Rejection::Lost)?;
                }
                Err(e) => {
                    log::warn!("{}: unexpected enqueue failure: {}", self.pool_name, e);
                    return Err(Rejection::Lost);
                }
            }
        }
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("pool_name", &self.pool_name)
            .field("poll", &self.poll)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
