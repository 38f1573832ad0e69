//! Core types and traits for the waiting pool

pub mod cancellation;
pub mod error;
pub mod job;
pub mod result;

pub use cancellation::{CancellationCallbackGuard, CancellationReason, CancellationToken};
pub use error::{PoolError, Result};
pub use job::{BoxedJob, ClosureJob, Job};
pub use result::{PendingResult, ValueJob};
