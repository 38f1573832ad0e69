//! The waiting pool and its parts
//!
//! [`WaitingPool`] wires together the admission gate, the worker threads and
//! the shutdown coordinator around one shared [`JobQueue`](crate::queue::JobQueue).

mod admission;
pub mod config;
pub mod naming;
mod shutdown;
pub mod state;
pub mod stats;
mod waiting_pool;
pub mod worker;

pub use admission::{AdmissionStatSnapshot, AdmissionStats};
pub use config::PoolConfig;
pub use naming::ThreadNamer;
pub use shutdown::ShutdownOutcome;
pub use state::ExecutorState;
pub use stats::PoolStats;
pub use waiting_pool::WaitingPool;
pub use worker::{Termination, WorkerPool, WorkerStatSnapshot, WorkerStats};
