//! Value-producing jobs and their result handles

use crate::core::error::{PoolError, Result};
use crate::core::job::{panic_message, Job};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Handle to the single result of a value-producing job
///
/// The handle is bound when the job is admitted and fulfilled exactly once by
/// the worker that runs the job. If the pool discards the job before running it
/// (forced shutdown), the handle reports [`PoolError::Abandoned`].
///
/// # Example
///
/// ```rust
/// use waiting_pool::prelude::*;
///
/// let pool = WaitingPool::new("doc", 4, 2)?;
/// let pending = pool.submit(|| Ok(6 * 7)).expect("pool is running");
/// assert_eq!(pending.wait()?, 42);
/// pool.shutdown();
/// # Ok::<(), PoolError>(())
/// ```
#[derive(Debug)]
pub struct PendingResult<T> {
    receiver: Receiver<Result<T>>,
    owner: String,
    taken: AtomicBool,
}

impl<T> PendingResult<T> {
    /// Blocks until the job has run and returns its outcome
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TaskFailed`] carrying the job's own error message,
    /// [`PoolError::TaskPanicked`] if the job panicked, or
    /// [`PoolError::Abandoned`] if the pool dropped the job unexecuted.
    pub fn wait(self) -> Result<T> {
        if self.taken.load(Ordering::Acquire) {
            return Err(PoolError::ResultConsumed);
        }
        match self.receiver.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(PoolError::abandoned(&self.owner)),
        }
    }

    /// Waits up to `timeout` for the outcome
    ///
    /// Returns `None` if the job has not finished in time. Once an outcome has
    /// been returned, later calls yield [`PoolError::ResultConsumed`].
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        if self.taken.load(Ordering::Acquire) {
            return Some(Err(PoolError::ResultConsumed));
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(self.take(outcome)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.disconnected()),
        }
    }

    /// Returns the outcome if the job has already finished, without blocking
    pub fn try_get(&self) -> Option<Result<T>> {
        if self.taken.load(Ordering::Acquire) {
            return Some(Err(PoolError::ResultConsumed));
        }
        match self.receiver.try_recv() {
            Ok(outcome) => Some(self.take(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.disconnected()),
        }
    }

    /// Whether an outcome is waiting to be taken
    pub fn is_ready(&self) -> bool {
        !self.taken.load(Ordering::Acquire) && !self.receiver.is_empty()
    }

    fn take(&self, outcome: Result<T>) -> Result<T> {
        self.taken.store(true, Ordering::Release);
        outcome
    }

    fn disconnected(&self) -> Result<T> {
        // Sender gone without a value: the job was dropped unexecuted.
        self.taken.store(true, Ordering::Release);
        Err(PoolError::abandoned(&self.owner))
    }
}

/// A job that runs a closure producing a value and delivers it to a
/// [`PendingResult`]
pub struct ValueJob<F, T>
where
    F: FnOnce() -> Result<T> + Send,
    T: Send,
{
    closure: Option<F>,
    sender: Sender<Result<T>>,
    name: String,
}

impl<F, T> ValueJob<F, T>
where
    F: FnOnce() -> Result<T> + Send,
    T: Send,
{
    /// Creates the job together with the handle its result will be delivered to
    ///
    /// `owner` names the pool in [`PoolError::Abandoned`] messages.
    pub fn new(closure: F, owner: impl Into<String>) -> (Self, PendingResult<T>) {
        let (sender, receiver) = channel::bounded(1);
        let job = Self {
            closure: Some(closure),
            sender,
            name: "ValueJob".to_string(),
        };
        let pending = PendingResult {
            receiver,
            owner: owner.into(),
            taken: AtomicBool::new(false),
        };
        (job, pending)
    }
}

impl<F, T> Job for ValueJob<F, T>
where
    F: FnOnce() -> Result<T> + Send,
    T: Send,
{
    fn execute(&mut self) -> Result<()> {
        let closure = self.closure.take().ok_or_else(|| {
            PoolError::other("ValueJob already executed - cannot execute twice")
        })?;

        let outcome = match catch_unwind(AssertUnwindSafe(closure)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PoolError::task_failed(&self.name, e.to_string())),
            Err(payload) => Err(PoolError::task_panicked(
                &self.name,
                panic_message(payload.as_ref()),
            )),
        };

        let report = match &outcome {
            Ok(_) => Ok(()),
            Err(PoolError::TaskPanicked { message, .. }) => {
                Err(PoolError::task_panicked(&self.name, message.clone()))
            }
            Err(PoolError::TaskFailed { message, .. }) => {
                Err(PoolError::task_failed(&self.name, message.clone()))
            }
            Err(e) => Err(PoolError::task_failed(&self.name, e.to_string())),
        };

        // The producer may have dropped its handle; the outcome is then unobserved.
        let _ = self.sender.send(outcome);
        report
    }

    fn job_type(&self) -> &str {
        &self.name
    }
}
