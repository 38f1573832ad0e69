//! Graceful and forced shutdown

use crate::core::{CancellationReason, CancellationToken};
use crate::pool::state::{ExecutorState, StateCell};
use crate::pool::worker::{Termination, WorkerPool};
use crate::queue::JobQueue;
use crossbeam::channel;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a shutdown ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ShutdownOutcome {
    /// Every queued task ran and every worker exited
    Completed,
    /// The shutdown was interrupted; queued tasks were discarded
    Aborted {
        /// Number of queued tasks that never ran
        discarded: usize,
    },
}

impl ShutdownOutcome {
    /// Whether every queued task ran
    pub fn is_completed(&self) -> bool {
        matches!(self, ShutdownOutcome::Completed)
    }
}

/// Drives the `Running → Draining → Terminated` transition
pub(crate) struct ShutdownCoordinator {
    pool_name: String,
    state: Arc<StateCell>,
    queue: Arc<dyn JobQueue>,
    workers: Arc<WorkerPool>,
    abort_token: CancellationToken,
    drain_poll: Duration,
    termination_timeout: Duration,
    aborted: AtomicBool,
}

impl ShutdownCoordinator {
    pub(crate) fn new(
        pool_name: impl Into<String>,
        state: Arc<StateCell>,
        queue: Arc<dyn JobQueue>,
        workers: Arc<WorkerPool>,
        abort_token: CancellationToken,
        drain_poll: Duration,
        termination_timeout: Duration,
    ) -> Self {
        Self {
            pool_name: pool_name.into(),
            state,
            queue,
            workers,
            abort_token,
            drain_poll,
            termination_timeout,
            aborted: AtomicBool::new(false),
        }
    }

    /// Current state; an aborted pool reads `Terminated` once its last worker left
    pub(crate) fn observe_state(&self) -> ExecutorState {
        let state = self.state.load();
        if state == ExecutorState::Draining
            && self.aborted.load(Ordering::Acquire)
            && self.workers.is_terminated()
        {
            self.state.terminate();
            return ExecutorState::Terminated;
        }
        state
    }

    /// Stops admissions, drains the queue and waits for the workers
    ///
    /// Cancelling `cancel` at any point before the workers are gone switches
    /// to a forced abort.
    pub(crate) fn shutdown(&self, cancel: &CancellationToken) -> ShutdownOutcome {
        if self.aborted.load(Ordering::Acquire) {
            return ShutdownOutcome::Aborted { discarded: 0 };
        }
        if self.state.load() == ExecutorState::Terminated {
            return ShutdownOutcome::Completed;
        }

        if self.state.begin_draining() {
            log::debug!(
                "{}: is shutting down (after all tasks are finished)",
                self.pool_name
            );
        }
        // Wakes producers blocked on a full queue; they re-check the state and give up.
        self.queue.close();

        let (interrupt_tx, interrupt) = channel::bounded::<()>(1);
        let queue = Arc::clone(&self.queue);
        let _wake = cancel.on_cancel(move || {
            let _ = interrupt_tx.try_send(());
            queue.wake_waiters();
        });

        let interrupted = || cancel.is_cancelled();
        while !self.queue.wait_until_empty(self.drain_poll, &interrupted) {
            if cancel.is_cancelled() {
                return self.abort();
            }
            log::trace!(
                "{}: {} task(s) remaining in queue",
                self.pool_name,
                self.queue.len()
            );
        }

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return self.abort();
            }
            match self
                .workers
                .await_termination(self.termination_timeout, &interrupt)
            {
                Termination::Terminated => break,
                Termination::Interrupted => return self.abort(),
                Termination::TimedOut => {
                    attempt += 1;
                    log::info!(
                        "{}: awaiting termination, {:?} elapsed",
                        self.pool_name,
                        self.termination_timeout * attempt
                    );
                }
            }
        }

        if let Err(e) = self.workers.join_all() {
            log::error!("{}: {}", self.pool_name, e);
        }
        self.state.terminate();

        let (processed, failed, panicked) = self.workers.totals();
        log::debug!(
            "{}: terminated (processed: {}, failed: {}, panicked: {})",
            self.pool_name,
            processed,
            failed,
            panicked
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_pool_shutdown(&self.pool_name, processed, failed + panicked);

        ShutdownOutcome::Completed
    }

    fn abort(&self) -> ShutdownOutcome {
        log::warn!("{}: interrupt received, immediate shutdown", self.pool_name);
        self.aborted.store(true, Ordering::Release);

        // The queue is already closed, so once drained no worker can dequeue
        // a job that would then be dropped uncounted. Dropping the jobs
        // disconnects their result handles.
        let discarded = self.queue.drain().len();

        self.workers.abort();
        self.abort_token
            .cancel_with_reason(CancellationReason::PoolAborted);
        if discarded > 0 {
            log::warn!(
                "{}: discarded {} queued task(s)",
                self.pool_name,
                discarded
            );
        }
        self.workers.detach_all();

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_abort(&self.pool_name, discarded);

        ShutdownOutcome::Aborted { discarded }
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("pool_name", &self.pool_name)
            .field("drain_poll", &self.drain_poll)
            .field("termination_timeout", &self.termination_timeout)
            .field("aborted", &self.aborted.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClosureJob, PoolError};
    use crate::pool::naming::ThreadNamer;
    use crate::queue::BoundedQueue;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Instant;

    struct Fixture {
        queue: Arc<dyn JobQueue>,
        state: Arc<StateCell>,
        abort_token: CancellationToken,
        coordinator: ShutdownCoordinator,
    }

    fn fixture(workers: usize, capacity: usize) -> Fixture {
        let queue: Arc<dyn JobQueue> = Arc::new(BoundedQueue::new(capacity));
        let state = Arc::new(StateCell::new());
        let abort_token = CancellationToken::new();
        let pool = WorkerPool::spawn(
            workers,
            &ThreadNamer::new("shutdown"),
            Arc::clone(&queue),
            Duration::from_millis(10),
        )
        .expect("Failed to spawn workers");
        let coordinator = ShutdownCoordinator::new(
            "shutdown",
            Arc::clone(&state),
            Arc::clone(&queue),
            Arc::new(pool),
            abort_token.clone(),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        Fixture {
            queue,
            state,
            abort_token,
            coordinator,
        }
    }

    #[test]
    fn test_graceful_shutdown_runs_queued_tasks() {
        let f = fixture(1, 8);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let c = Arc::clone(&counter);
            f.queue
                .try_send(Box::new(ClosureJob::new(move || {
                    thread::sleep(Duration::from_millis(10));
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })))
                .unwrap();
        }

        let outcome = f.coordinator.shutdown(&CancellationToken::new());
        assert_eq!(outcome, ShutdownOutcome::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(f.state.load(), ExecutorState::Terminated);
        assert!(!f.abort_token.is_cancelled());

        // Repeated call is a no-op
        assert_eq!(
            f.coordinator.shutdown(&CancellationToken::new()),
            ShutdownOutcome::Completed
        );
    }

    #[test]
    fn test_cancelled_shutdown_aborts() {
        let f = fixture(1, 8);
        let (started_tx, started_rx) = channel::bounded(1);
        let token_seen = f.abort_token.clone();
        f.queue
            .try_send(Box::new(ClosureJob::new(move || {
                let _ = started_tx.send(());
                while !token_seen.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                Err(PoolError::cancelled("pool aborted"))
            })))
            .unwrap();
        for _ in 0..3 {
            f.queue
                .try_send(Box::new(ClosureJob::new(|| Ok(()))))
                .unwrap();
        }
        started_rx.recv().unwrap();

        let cancel = CancellationToken::new();
        let c = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            c.cancel();
        });

        let start = Instant::now();
        let outcome = f.coordinator.shutdown(&cancel);
        canceller.join().unwrap();

        assert_eq!(outcome, ShutdownOutcome::Aborted { discarded: 3 });
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(
            f.abort_token.reason(),
            Some(CancellationReason::PoolAborted)
        );
        assert!(f.queue.is_empty());

        assert_eq!(
            f.coordinator.shutdown(&CancellationToken::new()),
            ShutdownOutcome::Aborted { discarded: 0 }
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while f.coordinator.observe_state() != ExecutorState::Terminated {
            assert!(Instant::now() < deadline, "workers did not exit after abort");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_abort_accounts_for_every_queued_task() {
        let f = fixture(3, 64);
        let executed = Arc::new(AtomicUsize::new(0));
        let total = 60;
        for _ in 0..total {
            let e = Arc::clone(&executed);
            f.queue
                .try_send(Box::new(ClosureJob::new(move || {
                    thread::sleep(Duration::from_millis(2));
                    e.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })))
                .unwrap();
        }

        let cancel = CancellationToken::with_timeout(Duration::from_millis(20));
        let discarded = match f.coordinator.shutdown(&cancel) {
            ShutdownOutcome::Aborted { discarded } => discarded,
            ShutdownOutcome::Completed => panic!("60 tasks cannot drain in 20ms"),
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while f.coordinator.observe_state() != ExecutorState::Terminated {
            assert!(Instant::now() < deadline, "workers did not exit after abort");
            thread::sleep(Duration::from_millis(5));
        }

        // Every task either ran or was counted as discarded
        assert_eq!(executed.load(Ordering::SeqCst) + discarded, total);
    }

    #[test]
    fn test_pre_cancelled_token_aborts_immediately() {
        let f = fixture(1, 4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = f.coordinator.shutdown(&cancel);
        assert!(!outcome.is_completed());
        assert_eq!(f.state.load(), ExecutorState::Draining);
    }
}
