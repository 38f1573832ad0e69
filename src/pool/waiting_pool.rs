//! The blocking, bounded executor

use crate::core::{BoxedJob, CancellationToken, ClosureJob, Job, PendingResult, Result, ValueJob};
use crate::pool::admission::AdmissionGate;
use crate::pool::config::PoolConfig;
use crate::pool::naming::ThreadNamer;
use crate::pool::shutdown::{ShutdownCoordinator, ShutdownOutcome};
use crate::pool::state::{ExecutorState, StateCell};
use crate::pool::stats::PoolStats;
use crate::pool::worker::{WorkerPool, WorkerStatSnapshot};
use crate::queue::{BoundedQueue, JobQueue};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A fixed-size worker pool whose producers block while the queue is full
///
/// Instead of refusing work when its queue is at capacity, the pool makes the
/// submitting thread wait until a slot frees. Tasks start in the order they
/// were admitted. Admission is refused only once shutdown has begun, or when
/// the caller cancels the token it passed in.
///
/// # Shutdown
///
/// [`shutdown`](Self::shutdown) stops admissions, lets the workers drain every
/// queued task and then joins them. [`shutdown_with_cancel`](Self::shutdown_with_cancel)
/// turns into a forced abort when its token fires: queued tasks are discarded
/// and tasks started with [`execute_cancellable`](Self::execute_cancellable)
/// see their token cancelled.
///
/// Dropping a pool that is still running performs a graceful shutdown.
///
/// # Example
///
/// ```rust
/// use waiting_pool::prelude::*;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let pool = WaitingPool::new("isbn-check", 2, 2)?;
/// let checked = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..10 {
///     let checked = Arc::clone(&checked);
///     // Blocks whenever two tasks are already queued
///     assert!(pool.execute(move || {
///         checked.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }));
/// }
///
/// assert!(pool.shutdown().is_completed());
/// assert_eq!(checked.load(Ordering::SeqCst), 10);
/// assert!(!pool.execute(|| Ok(())));
/// # Ok::<(), PoolError>(())
/// ```
pub struct WaitingPool {
    config: PoolConfig,
    queue: Arc<dyn JobQueue>,
    gate: AdmissionGate,
    workers: Arc<WorkerPool>,
    coordinator: ShutdownCoordinator,
    abort_token: CancellationToken,
    idle: CancellationToken,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for WaitingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingPool")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("queued", &self.queue_len())
            .field("capacity", &self.capacity())
            .field("workers", &self.workers)
            .finish()
    }
}

impl WaitingPool {
    /// Create a pool with `workers` threads and room for `capacity` queued tasks
    ///
    /// Both counts are clamped to at least 1.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`](crate::PoolError::SpawnError) if a
    /// worker thread cannot be created.
    pub fn new<S: Into<String>>(name: S, capacity: usize, workers: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(name, capacity, workers))
    }

    /// Create a pool from a configuration
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`](crate::PoolError::SpawnError) if a
    /// worker thread cannot be created.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        let config = config.normalized();
        let queue: Arc<dyn JobQueue> = Arc::new(BoundedQueue::new(config.capacity));
        Self::with_queue(config, queue)
    }

    /// Create a pool on top of a caller-supplied queue
    ///
    /// The queue's own capacity is authoritative; `config.capacity` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`](crate::PoolError::SpawnError) if a
    /// worker thread cannot be created.
    pub fn with_queue(config: PoolConfig, queue: Arc<dyn JobQueue>) -> Result<Self> {
        let mut config = config.normalized();
        config.capacity = queue.capacity();

        let state = Arc::new(StateCell::new());
        let namer = ThreadNamer::new(config.name.clone());
        let workers = Arc::new(WorkerPool::spawn(
            config.workers,
            &namer,
            Arc::clone(&queue),
            config.worker_poll,
        )?);

        let gate = AdmissionGate::new(
            config.name.clone(),
            Arc::clone(&queue),
            Arc::clone(&state),
            config.admission_poll,
        );
        let abort_token = CancellationToken::new();
        let coordinator = ShutdownCoordinator::new(
            config.name.clone(),
            state,
            Arc::clone(&queue),
            Arc::clone(&workers),
            abort_token.clone(),
            config.drain_poll,
            config.termination_timeout,
        );

        log::debug!(
            "{}: started with {} worker(s), queue capacity {}",
            config.name,
            config.workers,
            config.capacity
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_pool_start(&config.name, config.workers, config.capacity);

        Ok(Self {
            config,
            queue,
            gate,
            workers,
            coordinator,
            abort_token,
            idle: CancellationToken::new(),
            started_at: Utc::now(),
        })
    }

    /// Run `f` on a worker, blocking while the queue is full
    ///
    /// Returns `false` if the pool is shutting down; the task is then dropped
    /// with a warning. An error returned by `f` is logged by the worker.
    pub fn execute<F>(&self, f: F) -> bool
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.execute_with_cancel(f, &self.idle)
    }

    /// Like [`execute`](Self::execute), giving up when `cancel` fires while waiting
    pub fn execute_with_cancel<F>(&self, f: F, cancel: &CancellationToken) -> bool
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.admit(Box::new(ClosureJob::new(f)), cancel)
    }

    /// Run any [`Job`] on a worker, blocking while the queue is full
    pub fn execute_job<J: Job + 'static>(&self, job: J) -> bool {
        self.admit(Box::new(job), &self.idle)
    }

    /// Run `f` with a token that is cancelled if the pool is force-aborted
    ///
    /// ```rust
    /// use waiting_pool::prelude::*;
    ///
    /// let pool = WaitingPool::new("marc-convert", 4, 1)?;
    /// pool.execute_cancellable(|token| {
    ///     for _record in 0..1_000 {
    ///         token.check()?;
    ///     }
    ///     Ok(())
    /// });
    /// pool.shutdown();
    /// # Ok::<(), PoolError>(())
    /// ```
    pub fn execute_cancellable<F>(&self, f: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Result<()> + Send + 'static,
    {
        let token = self.abort_token.child();
        let job = ClosureJob::with_name(move || f(token), "CancellableJob");
        self.admit(Box::new(job), &self.idle)
    }

    /// Run `f` on a worker and get a handle to its result
    ///
    /// Blocks while the queue is full. Returns `None` if the pool is shutting
    /// down.
    pub fn submit<F, T>(&self, f: F) -> Option<PendingResult<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_with_cancel(f, &self.idle)
    }

    /// Like [`submit`](Self::submit), giving up when `cancel` fires while waiting
    ///
    /// ```rust
    /// use waiting_pool::prelude::*;
    /// use std::time::Duration;
    ///
    /// let pool = WaitingPool::new("ppn", 1, 1)?;
    /// let gate = pool.submit(|| { std::thread::sleep(Duration::from_millis(200)); Ok(()) });
    /// let _queued = pool.submit(|| Ok(()));
    ///
    /// // Queue is full: this call gives up after 20ms
    /// let deadline = CancellationToken::with_timeout(Duration::from_millis(20));
    /// assert!(pool.submit_with_cancel(|| Ok(1), &deadline).is_none());
    /// # drop(gate);
    /// # pool.shutdown();
    /// # Ok::<(), PoolError>(())
    /// ```
    pub fn submit_with_cancel<F, T>(
        &self,
        f: F,
        cancel: &CancellationToken,
    ) -> Option<PendingResult<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (job, pending) = ValueJob::new(f, self.config.name.clone());
        self.admit(Box::new(job), cancel).then_some(pending)
    }

    fn admit(&self, job: BoxedJob, cancel: &CancellationToken) -> bool {
        self.gate.admit(job, cancel).is_ok()
    }

    /// Stop admissions, run every queued task, then join the workers
    ///
    /// Blocks until the pool is terminated. Calling it again is harmless.
    pub fn shutdown(&self) -> ShutdownOutcome {
        self.coordinator.shutdown(&self.idle)
    }

    /// Like [`shutdown`](Self::shutdown), aborting if `cancel` fires first
    ///
    /// On abort the queued tasks are discarded (their result handles report
    /// [`PoolError::Abandoned`](crate::PoolError::Abandoned)), running
    /// cancellable tasks see their token cancelled, and the call returns
    /// without waiting for the workers.
    pub fn shutdown_with_cancel(&self, cancel: &CancellationToken) -> ShutdownOutcome {
        self.coordinator.shutdown(cancel)
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Maximum number of queued tasks
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Lifecycle state
    pub fn state(&self) -> ExecutorState {
        self.coordinator.observe_state()
    }

    /// Tasks waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Free queue slots
    pub fn remaining_capacity(&self) -> usize {
        self.queue.remaining_capacity()
    }

    /// Whether the pool accepts new tasks
    pub fn is_running(&self) -> bool {
        self.state() == ExecutorState::Running
    }

    /// Whether every worker has exited
    pub fn is_terminated(&self) -> bool {
        self.state() == ExecutorState::Terminated
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        let (processed, failed, panicked) = self.workers.totals();
        PoolStats {
            name: self.config.name.clone(),
            state: self.state(),
            capacity: self.capacity(),
            workers: self.worker_count(),
            queued: self.queue_len(),
            active: self.workers.busy(),
            admission: self.gate.stats().snapshot(),
            processed,
            failed,
            panicked,
            per_worker: self.workers.stats(),
            started_at: self.started_at,
        }
    }

    /// Per-worker statistics
    pub fn worker_stats(&self) -> Vec<WorkerStatSnapshot> {
        self.workers.stats()
    }
}

impl Drop for WaitingPool {
    fn drop(&mut self) {
        if self.state() == ExecutorState::Running {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PoolError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_pool_creation() {
        let pool = WaitingPool::new("isbn", 0, 0).expect("Failed to create pool");
        assert_eq!(pool.name(), "isbn");
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.worker_count(), 1);
        assert!(pool.is_running());
        assert_eq!(pool.remaining_capacity(), 1);
    }

    #[test]
    fn test_execute_and_shutdown() {
        let pool = WaitingPool::new("exec", 4, 2).expect("Failed to create pool");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let c = Arc::clone(&counter);
            assert!(pool.execute(move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }

        assert_eq!(pool.shutdown(), ShutdownOutcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert!(pool.is_terminated());

        let stats = pool.stats();
        assert_eq!(stats.processed, 20);
        assert_eq!(stats.admission.admitted, 20);
        assert_eq!(stats.state, ExecutorState::Terminated);
    }

    #[test]
    fn test_submit_returns_value() {
        let pool = WaitingPool::new("submit", 2, 1).expect("Failed to create pool");
        let pending = pool.submit(|| Ok("0-306-40615-2".len())).expect("admitted");
        assert_eq!(pending.wait().expect("value"), 13);
    }

    #[test]
    fn test_submit_failure_and_panic_are_contained() {
        let pool = WaitingPool::new("faults", 4, 1).expect("Failed to create pool");

        let failed = pool
            .submit(|| -> Result<u8> { Err(PoolError::other("bad prefix")) })
            .expect("admitted");
        let panicked = pool
            .submit(|| -> Result<u8> { panic!("kaputt") })
            .expect("admitted");
        let fine = pool.submit(|| Ok(1u8)).expect("admitted");

        assert!(matches!(failed.wait(), Err(PoolError::TaskFailed { .. })));
        assert!(matches!(panicked.wait(), Err(PoolError::TaskPanicked { .. })));
        assert_eq!(fine.wait().unwrap(), 1);

        pool.shutdown();
        let stats = pool.stats();
        assert_eq!((stats.processed, stats.failed, stats.panicked), (1, 1, 1));
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let pool = WaitingPool::new("closed", 1, 1).expect("Failed to create pool");
        pool.shutdown();

        let start = Instant::now();
        assert!(!pool.execute(|| Ok(())));
        assert!(pool.submit(|| Ok(())).is_none());
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(pool.stats().admission.rejected, 2);
    }

    #[test]
    fn test_execute_job_custom() {
        struct Checksum {
            digits: Vec<u32>,
            out: Arc<AtomicUsize>,
        }

        impl Job for Checksum {
            fn execute(&mut self) -> Result<()> {
                let sum: u32 = self.digits.iter().sum();
                self.out.store(sum as usize, Ordering::SeqCst);
                Ok(())
            }

            fn job_type(&self) -> &str {
                "Checksum"
            }
        }

        let pool = WaitingPool::new("custom", 2, 1).expect("Failed to create pool");
        let out = Arc::new(AtomicUsize::new(0));
        assert!(pool.execute_job(Checksum {
            digits: vec![9, 7, 8],
            out: Arc::clone(&out),
        }));
        pool.shutdown();
        assert_eq!(out.load(Ordering::SeqCst), 24);
    }

    #[test]
    fn test_drop_drains() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WaitingPool::new("drop", 8, 2).expect("Failed to create pool");
            for _ in 0..8 {
                let c = Arc::clone(&counter);
                pool.execute(move || {
                    thread::sleep(Duration::from_millis(5));
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_worker_thread_names() {
        let pool = WaitingPool::new("ppn", 4, 2).expect("Failed to create pool");
        let pending = pool
            .submit(|| Ok(thread::current().name().map(str::to_string)))
            .expect("admitted");
        let name = pending.wait().unwrap().expect("worker is named");
        assert!(name == "ppn-1" || name == "ppn-2", "unexpected name {}", name);

        let names: Vec<_> = pool.worker_stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["ppn-1", "ppn-2"]);
    }
}
