//! Cooperative cancellation
//!
//! A [`CancellationToken`] is the explicit stand-in for interrupting a thread.
//! Producers pass one to a cancel-aware admission call to abandon a blocked
//! wait, the caller of a cancel-aware shutdown passes one to force an abort,
//! and the pool hands a child of its own abort token to cancellable jobs so
//! in-flight work can stop early.
//!
//! # Example
//!
//! ```rust
//! use waiting_pool::CancellationToken;
//!
//! let parent = CancellationToken::new();
//! let child = parent.child();
//!
//! parent.cancel();
//!
//! assert!(parent.is_cancelled());
//! assert!(child.is_cancelled());
//! ```

use crate::core::{PoolError, Result};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

static NEXT_CALLBACK_ID: AtomicUsize = AtomicUsize::new(1);

fn next_callback_id() -> usize {
    NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Why a token was cancelled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    /// Explicitly cancelled via `cancel()`
    Manual,
    /// Cancelled because its timeout expired
    Timeout(Duration),
    /// Cancelled because the parent token was cancelled
    ParentCancelled,
    /// Cancelled because the owning pool was force-aborted
    PoolAborted,
    /// Custom cancellation reason
    Custom(String),
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::Manual => write!(f, "manually cancelled"),
            CancellationReason::Timeout(d) => write!(f, "timeout after {:?}", d),
            CancellationReason::ParentCancelled => write!(f, "parent was cancelled"),
            CancellationReason::PoolAborted => write!(f, "pool was aborted"),
            CancellationReason::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

struct StoredCallback {
    id: usize,
    callback: Box<dyn FnOnce() + Send + Sync>,
}

struct TokenInner {
    cancelled: AtomicBool,
    children: RwLock<Vec<Weak<TokenInner>>>,
    callbacks: RwLock<Vec<StoredCallback>>,
    reason: RwLock<Option<CancellationReason>>,
}

impl TokenInner {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            children: RwLock::new(Vec::new()),
            callbacks: RwLock::new(Vec::new()),
            reason: RwLock::new(None),
        })
    }
}

/// A thread-safe, cloneable cancellation flag with callbacks and children
///
/// Clones share state: cancelling any clone cancels them all.
///
/// ```rust
/// use waiting_pool::CancellationToken;
/// use std::thread;
/// use std::time::Duration;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// let handle = thread::spawn(move || {
///     while !worker_token.is_cancelled() {
///         thread::sleep(Duration::from_millis(5));
///     }
///     "stopped"
/// });
///
/// token.cancel();
/// assert_eq!(handle.join().unwrap(), "stopped");
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new token (not cancelled)
    pub fn new() -> Self {
        Self {
            inner: TokenInner::new(),
        }
    }

    /// Creates a child token that is cancelled whenever this one is
    ///
    /// A child of an already cancelled token starts cancelled.
    pub fn child(&self) -> Self {
        let child = CancellationToken {
            inner: TokenInner::new(),
        };

        {
            let mut children = self.inner.children.write();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        if self.is_cancelled() {
            child.cancel_with_reason(CancellationReason::ParentCancelled);
        }

        child
    }

    /// Creates a token that cancels itself after `timeout`
    ///
    /// ```rust
    /// use waiting_pool::{CancellationReason, CancellationToken};
    /// use std::time::Duration;
    ///
    /// let token = CancellationToken::with_timeout(Duration::from_millis(20));
    /// std::thread::sleep(Duration::from_millis(80));
    /// assert_eq!(token.reason(), Some(CancellationReason::Timeout(Duration::from_millis(20))));
    /// ```
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let timer = token.clone();

        std::thread::spawn(move || {
            std::thread::sleep(timeout);
            timer.cancel_with_reason(CancellationReason::Timeout(timeout));
        });

        token
    }

    /// Cancel with [`CancellationReason::Manual`]
    ///
    /// Idempotent; only the first cancellation records a reason.
    pub fn cancel(&self) {
        self.cancel_with_reason(CancellationReason::Manual);
    }

    /// Cancel with a specific reason, run callbacks, then cancel children
    pub fn cancel_with_reason(&self, reason: CancellationReason) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.inner.reason.write() = Some(reason);

        // Callbacks run outside the lock so they may touch this token.
        let callbacks: Vec<_> = self.inner.callbacks.write().drain(..).collect();
        for stored in callbacks {
            (stored.callback)();
        }

        let children: Vec<_> = self.inner.children.read().iter().cloned().collect();
        for child in children.iter().filter_map(Weak::upgrade) {
            CancellationToken { inner: child }
                .cancel_with_reason(CancellationReason::ParentCancelled);
        }
    }

    /// Check if this token has been cancelled
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The cancellation reason, if cancelled
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.read().clone()
    }

    /// Returns [`PoolError::Cancelled`] if cancelled, `Ok(())` otherwise
    ///
    /// ```rust
    /// use waiting_pool::{CancellationToken, Result};
    ///
    /// fn validate_all(ids: &[&str], token: &CancellationToken) -> Result<usize> {
    ///     let mut checked = 0;
    ///     for _id in ids {
    ///         token.check()?;
    ///         checked += 1;
    ///     }
    ///     Ok(checked)
    /// }
    ///
    /// let token = CancellationToken::new();
    /// assert_eq!(validate_all(&["a", "b"], &token).unwrap(), 2);
    /// token.cancel();
    /// assert!(validate_all(&["a"], &token).is_err());
    /// ```
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            let reason = self
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(PoolError::cancelled(reason))
        } else {
            Ok(())
        }
    }

    /// Registers a callback to run on cancellation
    ///
    /// Runs immediately if the token is already cancelled. The callback is
    /// unregistered when the returned guard is dropped.
    pub fn on_cancel<F>(&self, callback: F) -> CancellationCallbackGuard
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        let id = next_callback_id();

        let mut callbacks = self.inner.callbacks.write();
        // Checked under the lock: `cancel_with_reason` sets the flag before draining.
        if self.is_cancelled() {
            drop(callbacks);
            callback();
        } else {
            callbacks.push(StoredCallback {
                id,
                callback: Box::new(callback),
            });
        }

        CancellationCallbackGuard {
            token: Some(self.clone()),
            callback_id: id,
        }
    }

    fn remove_callback(&self, callback_id: usize) {
        self.inner.callbacks.write().retain(|c| c.id != callback_id);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters an [`on_cancel`](CancellationToken::on_cancel) callback when dropped
pub struct CancellationCallbackGuard {
    token: Option<CancellationToken>,
    callback_id: usize,
}

impl Drop for CancellationCallbackGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if !token.is_cancelled() {
                token.remove_callback(self.callback_id);
            }
        }
    }
}

impl CancellationCallbackGuard {
    /// Keeps the callback registered after the guard is gone
    pub fn detach(mut self) {
        self.token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_token_cancel_is_idempotent() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());

        token.cancel();
        token.cancel_with_reason(CancellationReason::PoolAborted);
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancellationReason::Manual));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(grandchild.is_cancelled());

        let other = parent.child();
        parent.cancel_with_reason(CancellationReason::PoolAborted);
        assert_eq!(other.reason(), Some(CancellationReason::ParentCancelled));
        assert_eq!(child.reason(), Some(CancellationReason::Manual));
    }

    #[test]
    fn test_child_of_cancelled_parent() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.child().is_cancelled());
    }

    #[test]
    fn test_callbacks() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        let _kept = token.on_cancel(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let c = Arc::clone(&counter);
        let dropped = token.on_cancel(move || {
            c.fetch_add(10, Ordering::SeqCst);
        });
        drop(dropped);

        let c = Arc::clone(&counter);
        token
            .on_cancel(move || {
                c.fetch_add(100, Ordering::SeqCst);
            })
            .detach();

        token.cancel();
        assert_eq!(counter.load(Ordering::SeqCst), 101);

        // Registered after cancellation: runs right away
        let c = Arc::clone(&counter);
        let _late = token.on_cancel(move || {
            c.fetch_add(1000, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 1101);
    }

    #[test]
    fn test_check() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel_with_reason(CancellationReason::Custom("operator".into()));
        match token.check() {
            Err(PoolError::Cancelled { reason }) => assert_eq!(reason, "operator"),
            other => panic!("expected Cancelled, got {:?}", other),
        }
    }

    #[test]
    fn test_with_timeout() {
        let token = CancellationToken::with_timeout(Duration::from_millis(20));
        assert!(!token.is_cancelled());
        std::thread::sleep(Duration::from_millis(150));
        assert!(token.is_cancelled());
    }
}
