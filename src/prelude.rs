//! Convenient re-exports for common types and traits

pub use crate::core::{
    BoxedJob, CancellationReason, CancellationToken, ClosureJob, Job, PendingResult, PoolError,
    Result,
};
pub use crate::pool::{ExecutorState, PoolConfig, PoolStats, ShutdownOutcome, WaitingPool};
