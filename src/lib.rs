//! # Waiting Pool
//!
//! A bounded thread pool whose producers wait for room instead of being
//! refused. Built for batch pipelines (identifier validation, record
//! conversion) that must never silently lose work while the pool runs.
//!
//! ## Features
//!
//! - **Blocking admission**: `execute`/`submit` wait while the queue is full
//! - **FIFO start order**: tasks start in the order they were admitted
//! - **Graceful shutdown**: queued work drains before the workers are joined
//! - **Forced abort**: a cancelled shutdown discards queued work and returns promptly
//! - **Named workers**: threads are called `"<pool name>-<n>"`
//! - **Statistics**: per-worker and admission counters, serializable to JSON
//!
//! ## Quick Start
//!
//! ```rust
//! use waiting_pool::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let pool = WaitingPool::new("isbn-check", 10, 4)?;
//!
//! for i in 0..100 {
//!     pool.execute(move || {
//!         log::trace!("validating record {}", i);
//!         Ok(())
//!     });
//! }
//!
//! let length = pool.submit(|| Ok("978-0-306-40615-7".len())).expect("pool is running");
//! assert_eq!(length.wait()?, 17);
//!
//! assert_eq!(pool.shutdown(), ShutdownOutcome::Completed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use waiting_pool::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let config = PoolConfig::new("marc-convert", 50, 8)
//!     .with_admission_poll(Duration::from_millis(500))
//!     .with_termination_timeout(Duration::from_secs(30));
//!
//! let pool = WaitingPool::with_config(config)?;
//! # pool.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Jobs
//!
//! ```rust
//! use waiting_pool::prelude::*;
//!
//! struct Normalize {
//!     record: String,
//! }
//!
//! impl Job for Normalize {
//!     fn execute(&mut self) -> Result<()> {
//!         self.record = self.record.trim().to_uppercase();
//!         Ok(())
//!     }
//!
//!     fn job_type(&self) -> &str {
//!         "Normalize"
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! # let pool = WaitingPool::new("doc", 2, 1)?;
//! pool.execute_job(Normalize {
//!     record: " ppn 123 ".to_string(),
//! });
//! # pool.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Aborting a Shutdown
//!
//! ```rust
//! use waiting_pool::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let pool = WaitingPool::new("ppn", 100, 1)?;
//! for _ in 0..100 {
//!     pool.execute(|| {
//!         std::thread::sleep(Duration::from_millis(10));
//!         Ok(())
//!     });
//! }
//!
//! let deadline = CancellationToken::with_timeout(Duration::from_millis(50));
//! match pool.shutdown_with_cancel(&deadline) {
//!     ShutdownOutcome::Aborted { discarded } => assert!(discarded > 0),
//!     ShutdownOutcome::Completed => unreachable!("a second of work cannot drain in 50ms"),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod tracing;

pub use core::{
    BoxedJob, CancellationReason, CancellationToken, ClosureJob, Job, PendingResult, PoolError,
    Result,
};
pub use pool::{
    ExecutorState, PoolConfig, PoolStats, ShutdownOutcome, WaitingPool, WorkerStatSnapshot,
    WorkerStats,
};
