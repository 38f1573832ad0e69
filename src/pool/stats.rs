//! Pool statistics snapshot

use crate::core::{PoolError, Result};
use crate::pool::admission::AdmissionStatSnapshot;
use crate::pool::state::ExecutorState;
use crate::pool::worker::WorkerStatSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time view of a [`WaitingPool`](crate::pool::WaitingPool)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoolStats {
    /// Pool name
    pub name: String,
    /// Lifecycle state when the snapshot was taken
    pub state: ExecutorState,
    /// Maximum number of queued tasks
    pub capacity: usize,
    /// Number of worker threads
    pub workers: usize,
    /// Tasks waiting in the queue
    pub queued: usize,
    /// Workers currently running a task
    pub active: usize,
    /// Admission counters
    pub admission: AdmissionStatSnapshot,
    /// Tasks that completed successfully
    pub processed: u64,
    /// Tasks that returned an error
    pub failed: u64,
    /// Tasks that panicked
    pub panicked: u64,
    /// Per-worker breakdown
    pub per_worker: Vec<WorkerStatSnapshot>,
    /// When the pool was constructed
    pub started_at: DateTime<Utc>,
}

impl PoolStats {
    /// Tasks that finished, whatever their outcome
    pub fn completed(&self) -> u64 {
        self.processed + self.failed + self.panicked
    }

    /// Render the snapshot as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Other`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PoolError::other(format!("failed to serialize pool stats: {}", e)))
    }
}
