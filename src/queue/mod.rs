//! Queue abstraction between the admission gate and the workers.
//!
//! The pool talks to its queue only through the [`JobQueue`] trait. The
//! built-in [`BoundedQueue`] is what [`WaitingPool`] uses by default; a custom
//! queue can be supplied with [`WaitingPool::with_queue`], e.g. to wrap the
//! default one with instrumentation.
//!
//! Producers never block inside the queue. Capacity waits happen in the
//! admission gate through [`JobQueue::wait_for_space`], which keeps the
//! check-then-enqueue sequence under the admission lock.
//!
//! [`WaitingPool`]: crate::pool::WaitingPool
//! [`WaitingPool::with_queue`]: crate::pool::WaitingPool::with_queue

mod bounded;

pub use bounded::BoundedQueue;

use crate::core::BoxedJob;
use std::time::Duration;

/// Errors that can occur during queue operations.
///
/// Variants that refuse a job hand it back in a [`BoxedJobHolder`] so the
/// caller can retry without losing it.
#[derive(Debug, PartialEq, Eq)]
pub enum QueueError {
    /// Queue is at capacity
    Full(BoxedJobHolder),
    /// Queue is closed and not accepting new jobs
    Closed(BoxedJobHolder),
    /// Queue refused the job for an internal, transient reason
    Rejected(BoxedJobHolder),
    /// Queue is empty (receive timed out)
    Empty,
    /// Queue is closed and empty, no job will ever arrive
    Disconnected,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "queue is full"),
            QueueError::Closed(_) => write!(f, "queue is closed"),
            QueueError::Rejected(_) => write!(f, "queue rejected the job"),
            QueueError::Empty => write!(f, "queue is empty"),
            QueueError::Disconnected => write!(f, "queue is closed and drained"),
        }
    }
}

impl std::error::Error for QueueError {}

/// A holder for a refused job so it can be recovered.
#[derive(Debug)]
pub struct BoxedJobHolder {
    job: Option<BoxedJob>,
}

impl BoxedJobHolder {
    /// Creates a new holder with the given job.
    pub fn new(job: BoxedJob) -> Self {
        Self { job: Some(job) }
    }

    /// Takes the job out of the holder.
    pub fn take(mut self) -> Option<BoxedJob> {
        self.job.take()
    }

    /// Returns a reference to the job if present.
    pub fn as_ref(&self) -> Option<&BoxedJob> {
        self.job.as_ref()
    }
}

impl PartialEq for BoxedJobHolder {
    fn eq(&self, other: &Self) -> bool {
        // Jobs have no identity; compare by presence only
        self.job.is_some() == other.job.is_some()
    }
}

impl Eq for BoxedJobHolder {}

/// Result type for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// A fixed-capacity FIFO of jobs shared by producers and workers.
///
/// # Contract
///
/// - `len()` never exceeds `capacity()`.
/// - Jobs leave in the order they were accepted by `try_send`.
/// - After `close()`, `try_send` fails with [`QueueError::Closed`] while
///   `recv_timeout` keeps handing out the remaining jobs, then reports
///   [`QueueError::Disconnected`].
/// - Every removal (receive or `drain`) wakes threads blocked in
///   `wait_for_space` / `wait_until_empty`.
pub trait JobQueue: Send + Sync {
    /// Enqueues a job without blocking.
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] at capacity, [`QueueError::Closed`] after `close()`,
    /// [`QueueError::Rejected`] for any other refusal.
    fn try_send(&self, job: BoxedJob) -> QueueResult<()>;

    /// Dequeues the oldest job, waiting up to `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// [`QueueError::Empty`] on timeout, [`QueueError::Disconnected`] once the
    /// queue is closed and empty.
    fn recv_timeout(&self, timeout: Duration) -> QueueResult<BoxedJob>;

    /// Stops accepting jobs. Already queued jobs stay receivable.
    fn close(&self);

    /// Whether `close()` has been called.
    fn is_closed(&self) -> bool;

    /// Number of queued jobs.
    fn len(&self) -> usize;

    /// Whether the queue holds no jobs.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued jobs.
    fn capacity(&self) -> usize;

    /// Free slots left.
    fn remaining_capacity(&self) -> usize {
        self.capacity().saturating_sub(self.len())
    }

    /// Blocks up to `timeout` until there is a free slot.
    ///
    /// Returns early, without space, as soon as `interrupted` reports `true`
    /// (it is evaluated while the queue's internal lock is held, so a
    /// [`wake_waiters`](Self::wake_waiters) call cannot be missed). Returns
    /// whether a slot is free.
    fn wait_for_space(&self, timeout: Duration, interrupted: &dyn Fn() -> bool) -> bool;

    /// Blocks up to `timeout` until the queue is empty.
    ///
    /// Same interruption rules as [`wait_for_space`](Self::wait_for_space).
    /// Returns whether the queue is empty.
    fn wait_until_empty(&self, timeout: Duration, interrupted: &dyn Fn() -> bool) -> bool;

    /// Wakes every thread blocked in this queue so it re-evaluates its condition.
    fn wake_waiters(&self);

    /// Removes and returns every queued job.
    fn drain(&self) -> Vec<BoxedJob>;
}
