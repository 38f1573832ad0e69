//! Error types for the waiting pool

/// Result type for pool and task operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in the waiting pool
///
/// Admission failures are not represented here: a rejected admission is
/// reported to the producer as `false` / `None`, never as an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker thread '{thread_name}': {message}")]
    SpawnError {
        /// Name the thread would have carried
        thread_name: String,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread '{thread_name}': {message}")]
    JoinError {
        /// Name of the worker thread
        thread_name: String,
        /// Error message
        message: String,
    },

    /// The task body returned an error
    #[error("Task '{task}' failed: {message}")]
    TaskFailed {
        /// Task type name
        task: String,
        /// Error message
        message: String,
    },

    /// The task body panicked
    #[error("Task '{task}' panicked: {message}")]
    TaskPanicked {
        /// Task type name
        task: String,
        /// Panic message
        message: String,
    },

    /// Work was cancelled through a cancellation token
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// Reason for cancellation
        reason: String,
    },

    /// An accepted task was discarded before it produced a result
    #[error("Task was abandoned by pool '{pool_name}' before producing a result")]
    Abandoned {
        /// Name of the pool that discarded the task
        pool_name: String,
    },

    /// The result of a task was already taken out of its handle
    #[error("Task result was already consumed")]
    ResultConsumed,

    /// Invalid configuration input
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// General error
    #[error("{0}")]
    Other(String),
}

impl PoolError {
    /// Create a spawn error
    pub fn spawn(thread_name: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::SpawnError {
            thread_name: thread_name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(thread_name: impl Into<String>, source: std::io::Error) -> Self {
        PoolError::SpawnError {
            thread_name: thread_name.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a join error
    pub fn join(thread_name: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::JoinError {
            thread_name: thread_name.into(),
            message: message.into(),
        }
    }

    /// Create a task failure error
    pub fn task_failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::TaskFailed {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create a task panic error
    pub fn task_panicked(task: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::TaskPanicked {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        PoolError::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create an abandoned error
    pub fn abandoned(pool_name: impl Into<String>) -> Self {
        PoolError::Abandoned {
            pool_name: pool_name.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        PoolError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PoolError::Other(msg.into())
    }

    /// Whether this error came from a panicking task
    pub fn is_panic(&self) -> bool {
        matches!(self, PoolError::TaskPanicked { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PoolError::task_failed("isbn-check", "bad checksum");
        assert!(matches!(err, PoolError::TaskFailed { .. }));
        assert!(!err.is_panic());

        let err = PoolError::task_panicked("isbn-check", "index out of bounds");
        assert!(err.is_panic());

        let err = PoolError::abandoned("marc");
        assert!(matches!(err, PoolError::Abandoned { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PoolError::task_failed("ValueJob", "boom");
        assert_eq!(err.to_string(), "Task 'ValueJob' failed: boom");

        let err = PoolError::abandoned("marc");
        assert_eq!(
            err.to_string(),
            "Task was abandoned by pool 'marc' before producing a result"
        );

        let err = PoolError::cancelled("manually cancelled");
        assert_eq!(err.to_string(), "Cancelled: manually cancelled");
    }

    #[test]
    fn test_spawn_error_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads left");
        let err = PoolError::spawn_with_source("marc-3", io_err);

        assert!(matches!(err, PoolError::SpawnError { source: Some(_), .. }));
        assert!(err.to_string().contains("'marc-3'"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
