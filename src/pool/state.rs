//! Executor lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a pool: `Running → Draining → Terminated`
///
/// Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorState {
    /// Accepting admissions
    Running,
    /// Shutdown requested; admissions rejected, queued work still runs
    Draining,
    /// Every worker has exited
    Terminated,
}

impl From<u8> for ExecutorState {
    fn from(value: u8) -> Self {
        match value {
            0 => ExecutorState::Running,
            1 => ExecutorState::Draining,
            _ => ExecutorState::Terminated,
        }
    }
}

impl From<ExecutorState> for u8 {
    fn from(value: ExecutorState) -> Self {
        match value {
            ExecutorState::Running => 0,
            ExecutorState::Draining => 1,
            ExecutorState::Terminated => 2,
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::Running => write!(f, "running"),
            ExecutorState::Draining => write!(f, "draining"),
            ExecutorState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Atomic cell holding an [`ExecutorState`], shared by gate, coordinator and pool
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ExecutorState::Running.into()))
    }

    pub(crate) fn load(&self) -> ExecutorState {
        self.0.load(Ordering::Acquire).into()
    }

    /// Running → Draining. Returns `false` if the pool had already left Running.
    pub(crate) fn begin_draining(&self) -> bool {
        self.0
            .compare_exchange(
                ExecutorState::Running.into(),
                ExecutorState::Draining.into(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn terminate(&self) {
        self.0.store(ExecutorState::Terminated.into(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let cell = StateCell::new();
        assert_eq!(cell.load(), ExecutorState::Running);

        assert!(cell.begin_draining());
        assert_eq!(cell.load(), ExecutorState::Draining);
        assert!(!cell.begin_draining());

        cell.terminate();
        assert_eq!(cell.load(), ExecutorState::Terminated);
        assert!(!cell.begin_draining());
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(ExecutorState::Draining.to_string(), "draining");
        assert_eq!(
            serde_json::to_string(&ExecutorState::Terminated).unwrap(),
            "\"terminated\""
        );
    }
}
