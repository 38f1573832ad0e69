//! Property-based tests for waiting_pool using proptest

use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use waiting_pool::core::BoxedJob;
use waiting_pool::prelude::*;
use waiting_pool::queue::{BoundedQueue, JobQueue, QueueResult};

/// Bounded queue that records the highest length it ever held
struct HighWaterQueue {
    inner: BoundedQueue,
    high_water: AtomicUsize,
}

impl HighWaterQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: BoundedQueue::new(capacity),
            high_water: AtomicUsize::new(0),
        }
    }
}

impl JobQueue for HighWaterQueue {
    fn try_send(&self, job: BoxedJob) -> QueueResult<()> {
        self.inner.try_send(job)?;
        self.high_water.fetch_max(self.inner.len(), Ordering::SeqCst);
        Ok(())
    }

    fn recv_timeout(&self, timeout: Duration) -> QueueResult<BoxedJob> {
        self.inner.recv_timeout(timeout)
    }

    fn close(&self) {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn drain(&self) -> Vec<BoxedJob> {
        self.inner.drain()
    }

    fn wake_waiters(&self) {
        self.inner.wake_waiters()
    }

    fn wait_for_space(&self, timeout: Duration, interrupted: &dyn Fn() -> bool) -> bool {
        self.inner.wait_for_space(timeout, interrupted)
    }

    fn wait_until_empty(&self, timeout: Duration, interrupted: &dyn Fn() -> bool) -> bool {
        self.inner.wait_until_empty(timeout, interrupted)
    }
}

fn config(name: &str, capacity: usize, workers: usize) -> PoolConfig {
    PoolConfig::new(name, capacity, workers)
        .with_admission_poll(Duration::from_millis(10))
        .with_drain_poll(Duration::from_millis(5))
        .with_worker_poll(Duration::from_millis(5))
}

// ============================================================================
// Configuration
// ============================================================================

proptest! {
    /// Construction parameters are clamped, never rejected
    #[test]
    fn test_config_clamps(capacity in 0usize..64, workers in 0usize..16, name in "[a-z]{0,10}") {
        let config = PoolConfig::new(name.clone(), capacity, workers);

        prop_assert_eq!(config.capacity, capacity.max(1));
        prop_assert_eq!(config.workers, workers.max(1));
        if name.is_empty() {
            prop_assert_eq!(config.name, "waiting-pool");
        } else {
            prop_assert_eq!(config.name, name);
        }
    }

    /// JSON keeps every field
    #[test]
    fn test_config_json(capacity in 1usize..1000, workers in 1usize..32, poll_ms in 1u64..5000) {
        let config = PoolConfig::new("json", capacity, workers)
            .with_admission_poll(Duration::from_millis(poll_ms));
        let json = serde_json::to_string(&config).unwrap();

        prop_assert_eq!(PoolConfig::from_json(&json).unwrap(), config);
    }
}

// ============================================================================
// Pool behavior
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Queue length never exceeds capacity and no admitted task is lost
    #[test]
    fn test_capacity_bound_under_concurrent_producers(
        capacity in 1usize..6,
        workers in 1usize..4,
        producers in 1usize..5,
        tasks_per_producer in 1usize..25,
    ) {
        let queue = Arc::new(HighWaterQueue::new(capacity));
        let pool = Arc::new(
            WaitingPool::with_queue(config("bound", capacity, workers), queue.clone())
                .expect("Failed to create pool"),
        );
        let executed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..producers)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let executed = Arc::clone(&executed);
                thread::spawn(move || {
                    for _ in 0..tasks_per_producer {
                        let executed = Arc::clone(&executed);
                        assert!(pool.execute(move || {
                            executed.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        prop_assert!(pool.shutdown().is_completed());
        prop_assert!(queue.high_water.load(Ordering::SeqCst) <= capacity);
        prop_assert_eq!(executed.load(Ordering::SeqCst), producers * tasks_per_producer);
    }

    /// A single producer's tasks start in submission order on a single worker
    #[test]
    fn test_single_worker_fifo(capacity in 1usize..8, tasks in 1usize..40) {
        let pool = WaitingPool::with_config(config("fifo", capacity, 1))
            .expect("Failed to create pool");
        let order = Arc::new(Mutex::new(Vec::with_capacity(tasks)));

        for id in 0..tasks {
            let order = Arc::clone(&order);
            pool.execute(move || {
                order.lock().push(id);
                Ok(())
            });
        }
        pool.shutdown();

        prop_assert_eq!(order.lock().clone(), (0..tasks).collect::<Vec<_>>());
    }

    /// Every submitted value comes back through its handle
    #[test]
    fn test_submit_values(values in prop::collection::vec(any::<u32>(), 1..30), workers in 1usize..4) {
        let pool = WaitingPool::with_config(config("values", 3, workers))
            .expect("Failed to create pool");

        let pending: Vec<_> = values
            .iter()
            .map(|&v| pool.submit(move || Ok(v)).expect("admitted"))
            .collect();
        let results: Vec<u32> = pending.into_iter().map(|p| p.wait().unwrap()).collect();

        prop_assert_eq!(results, values);
        pool.shutdown();
    }
}
