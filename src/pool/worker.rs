//! Worker threads

use crate::core::{job::panic_message, BoxedJob, PoolError, Result};
use crate::pool::naming::ThreadNamer;
use crate::queue::{JobQueue, QueueError};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use crossbeam::select;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::{span, Level};

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Jobs that completed successfully
    pub jobs_processed: AtomicU64,
    /// Jobs that returned an error
    pub jobs_failed: AtomicU64,
    /// Jobs that panicked
    pub jobs_panicked: AtomicU64,
    /// Total time spent running jobs (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total jobs processed
    pub fn get_jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get total jobs failed
    pub fn get_jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get total jobs panicked
    pub fn get_jobs_panicked(&self) -> u64 {
        self.jobs_panicked.load(Ordering::Relaxed)
    }

    /// Get average processing time per job in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.get_jobs_processed() + self.get_jobs_failed() + self.get_jobs_panicked();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    fn snapshot(&self, name: &str) -> WorkerStatSnapshot {
        WorkerStatSnapshot {
            name: name.to_string(),
            jobs_processed: self.get_jobs_processed(),
            jobs_failed: self.get_jobs_failed(),
            jobs_panicked: self.get_jobs_panicked(),
            average_processing_time_us: self.get_average_processing_time_us(),
        }
    }
}

/// Point-in-time copy of one worker's statistics
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkerStatSnapshot {
    /// Thread name, `"<pool name>-<n>"`
    pub name: String,
    /// Jobs that completed successfully
    pub jobs_processed: u64,
    /// Jobs that returned an error
    pub jobs_failed: u64,
    /// Jobs that panicked
    pub jobs_panicked: u64,
    /// Average time per job in microseconds
    pub average_processing_time_us: f64,
}

/// How a bounded termination wait ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Every worker has exited
    Terminated,
    /// The wait timed out with workers still alive
    TimedOut,
    /// The interrupt channel fired
    Interrupted,
}

/// Context shared by every worker thread of one pool
struct Shared {
    pool_name: String,
    queue: Arc<dyn JobQueue>,
    poll_interval: Duration,
    abort: AtomicBool,
    busy: AtomicUsize,
}

/// The fixed set of worker threads of a pool
///
/// Each worker pulls the oldest job from the queue, runs it to completion and
/// loops. Workers leave when the queue is closed and empty, or before their
/// next dequeue once [`abort`](Self::abort) was called.
pub struct WorkerPool {
    shared: Arc<Shared>,
    stats: Vec<(String, Arc<WorkerStats>)>,
    threads: Mutex<Vec<(String, JoinHandle<()>)>>,
    exited: Receiver<()>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("pool_name", &self.shared.pool_name)
            .field("workers", &self.names())
            .field("busy", &self.busy())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl WorkerPool {
    /// Spawn `count` workers named by `namer`, all pulling from `queue`
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`] if a thread cannot be created. Workers
    /// spawned before the failure are stopped and joined first.
    pub fn spawn(
        count: usize,
        namer: &ThreadNamer,
        queue: Arc<dyn JobQueue>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let pool_name = namer.prefix().to_string();
        let shared = Arc::new(Shared {
            pool_name,
            queue,
            poll_interval,
            abort: AtomicBool::new(false),
            busy: AtomicUsize::new(0),
        });

        // Each worker owns a sender clone; the channel disconnects when the last one exits.
        let (exit_tx, exited) = channel::bounded::<()>(0);

        let mut stats = Vec::with_capacity(count);
        let mut threads = Vec::with_capacity(count);
        for _ in 0..count {
            let worker_stats = Arc::new(WorkerStats::new());
            let thread_stats = Arc::clone(&worker_stats);
            let thread_shared = Arc::clone(&shared);
            let exit_guard = exit_tx.clone();

            match namer.spawn(move || Self::run(thread_shared, thread_stats, exit_guard)) {
                Ok((name, thread)) => {
                    stats.push((name.clone(), worker_stats));
                    threads.push((name, thread));
                }
                Err(e) => {
                    shared.abort.store(true, Ordering::Release);
                    shared.queue.close();
                    for (_, thread) in threads {
                        let _ = thread.join();
                    }
                    return Err(e);
                }
            }
        }
        drop(exit_tx);

        Ok(Self {
            shared,
            stats,
            threads: Mutex::new(threads),
            exited,
        })
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    /// Whether the pool has no workers
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Thread names of the workers
    pub fn names(&self) -> Vec<&str> {
        self.stats.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of workers currently running a job
    pub fn busy(&self) -> usize {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// Whether every worker thread has exited
    pub fn is_terminated(&self) -> bool {
        matches!(self.exited.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Waits up to `timeout` for every worker to exit
    ///
    /// A message (or disconnect) on `interrupt` ends the wait early.
    pub fn await_termination(&self, timeout: Duration, interrupt: &Receiver<()>) -> Termination {
        select! {
            recv(self.exited) -> _ => Termination::Terminated,
            recv(interrupt) -> _ => Termination::Interrupted,
            default(timeout) => Termination::TimedOut,
        }
    }

    /// Makes every worker exit before its next dequeue
    ///
    /// Jobs already running are not interrupted.
    pub fn abort(&self) {
        self.shared.abort.store(true, Ordering::Release);
        self.shared.queue.wake_waiters();
    }

    /// Joins every worker thread
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::JoinError`] for the first worker whose thread
    /// panicked outside job execution. The remaining workers are still joined.
    pub fn join_all(&self) -> Result<()> {
        let threads = std::mem::take(&mut *self.threads.lock());
        let mut first_error = None;
        for (name, thread) in threads {
            if let Err(payload) = thread.join() {
                let message = panic_message(payload.as_ref());
                first_error.get_or_insert_with(|| PoolError::join(&name, message));
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Drops every join handle, leaving the threads to finish on their own
    pub fn detach_all(&self) {
        self.threads.lock().clear();
    }

    /// Snapshot of every worker's statistics
    pub fn stats(&self) -> Vec<WorkerStatSnapshot> {
        self.stats
            .iter()
            .map(|(name, stats)| stats.snapshot(name))
            .collect()
    }

    /// Sums `(processed, failed, panicked)` over every worker
    pub fn totals(&self) -> (u64, u64, u64) {
        self.stats.iter().fold((0, 0, 0), |acc, (_, s)| {
            (
                acc.0 + s.get_jobs_processed(),
                acc.1 + s.get_jobs_failed(),
                acc.2 + s.get_jobs_panicked(),
            )
        })
    }

    /// Main worker loop
    fn run(shared: Arc<Shared>, stats: Arc<WorkerStats>, _exit_guard: Sender<()>) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(
            Level::DEBUG,
            "worker",
            name = std::thread::current().name().unwrap_or("unnamed")
        );
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        log::debug!("{}: worker started", shared.pool_name);

        while !shared.abort.load(Ordering::Acquire) {
            match shared.queue.recv_timeout(shared.poll_interval) {
                // A dequeued job always runs; abort only stops the next dequeue.
                Ok(mut job) => {
                    shared.busy.fetch_add(1, Ordering::AcqRel);
                    #[cfg(feature = "tracing")]
                    crate::tracing::metrics::record_worker_busy(shared.busy.load(Ordering::Relaxed));

                    Self::execute_job(&shared.pool_name, &mut job, &stats);

                    shared.busy.fetch_sub(1, Ordering::AcqRel);
                    #[cfg(feature = "tracing")]
                    crate::tracing::metrics::record_worker_idle(shared.busy.load(Ordering::Relaxed));
                }
                Err(QueueError::Empty) => continue,
                Err(QueueError::Disconnected) => break,
                Err(e) => {
                    log::warn!("{}: worker stopping on queue error: {}", shared.pool_name, e);
                    break;
                }
            }
        }

        log::debug!(
            "{}: worker exiting (processed: {}, failed: {}, panicked: {})",
            shared.pool_name,
            stats.get_jobs_processed(),
            stats.get_jobs_failed(),
            stats.get_jobs_panicked()
        );
    }

    /// Execute a single job with panic protection
    fn execute_job(pool_name: &str, job: &mut BoxedJob, stats: &WorkerStats) {
        #[cfg(feature = "tracing")]
        let job_span = span!(Level::DEBUG, "task", task = job.job_type());
        #[cfg(feature = "tracing")]
        let _job_guard = job_span.enter();

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| job.execute()));
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(())) => {
                stats.jobs_processed.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_completion(elapsed, true);
            }
            Ok(Err(e)) if e.is_panic() => {
                log::error!("{}: task '{}' panicked: {}", pool_name, job.job_type(), e);
                stats.jobs_panicked.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_panic(elapsed);
            }
            Ok(Err(e)) => {
                log::warn!("{}: task '{}' failed: {}", pool_name, job.job_type(), e);
                stats.jobs_failed.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_completion(elapsed, false);
            }
            Err(payload) => {
                log::error!(
                    "{}: task '{}' panicked: {}",
                    pool_name,
                    job.job_type(),
                    panic_message(payload.as_ref())
                );
                stats.jobs_panicked.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_panic(elapsed);
            }
        }

        stats
            .total_processing_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }
}
