//! Bounded FIFO queue with capacity limit.

use super::{BoxedJobHolder, JobQueue, QueueError, QueueResult};
use crate::core::BoxedJob;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

struct State {
    jobs: VecDeque<BoxedJob>,
    closed: bool,
}

/// A bounded FIFO queue with a fixed capacity.
///
/// Closing and enqueueing happen under the same lock, so no job can slip in
/// after `close()` and be stranded once the workers have left.
///
/// # Example
///
/// ```rust
/// use waiting_pool::queue::{BoundedQueue, JobQueue, QueueError};
/// use waiting_pool::core::ClosureJob;
///
/// let queue = BoundedQueue::new(1);
/// queue.try_send(Box::new(ClosureJob::new(|| Ok(())))).unwrap();
///
/// match queue.try_send(Box::new(ClosureJob::new(|| Ok(())))) {
///     Err(QueueError::Full(holder)) => assert!(holder.take().is_some()),
///     _ => panic!("expected Full error"),
/// }
/// ```
pub struct BoundedQueue {
    state: Mutex<State>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl BoundedQueue {
    /// Creates a new bounded queue.
    ///
    /// A `capacity` below 1 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedQueue")
            .field("len", &state.jobs.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}

impl JobQueue for BoundedQueue {
    fn try_send(&self, job: BoxedJob) -> QueueResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed(BoxedJobHolder::new(job)));
        }
        if state.jobs.len() >= self.capacity {
            return Err(QueueError::Full(BoxedJobHolder::new(job)));
        }
        state.jobs.push_back(job);
        drop(state);

        self.not_empty.notify_one();
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> QueueResult<BoxedJob> {
        let mut state = self.state.lock();

        if state.jobs.is_empty() && !state.closed {
            self.not_empty.wait_for(&mut state, timeout);
        }

        match state.jobs.pop_front() {
            Some(job) => {
                drop(state);
                self.not_full.notify_all();
                Ok(job)
            }
            None if state.closed => Err(QueueError::Disconnected),
            None => Err(QueueError::Empty),
        }
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn wait_for_space(&self, timeout: Duration, interrupted: &dyn Fn() -> bool) -> bool {
        let mut state = self.state.lock();
        if state.jobs.len() < self.capacity {
            return true;
        }
        if interrupted() {
            return false;
        }
        self.not_full.wait_for(&mut state, timeout);
        state.jobs.len() < self.capacity
    }

    fn wait_until_empty(&self, timeout: Duration, interrupted: &dyn Fn() -> bool) -> bool {
        let mut state = self.state.lock();
        if state.jobs.is_empty() {
            return true;
        }
        if interrupted() {
            return false;
        }
        self.not_full.wait_for(&mut state, timeout);
        state.jobs.is_empty()
    }

    fn wake_waiters(&self) {
        // Taking the lock orders this wake-up after any in-progress condition check.
        let _state = self.state.lock();
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    fn drain(&self) -> Vec<BoxedJob> {
        let jobs: Vec<_> = self.state.lock().jobs.drain(..).collect();
        self.not_full.notify_all();
        jobs
    }
}
