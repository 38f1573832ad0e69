//! Worker thread naming

use crate::core::{PoolError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// Spawns threads named `"<pool name>-<n>"`, counting from 1
///
/// Replaces the anonymous names the platform would otherwise assign so a
/// thread dump or log line points straight at the owning pool.
#[derive(Debug)]
pub struct ThreadNamer {
    prefix: String,
    next: AtomicUsize,
}

impl ThreadNamer {
    /// Create a namer for the given pool name
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicUsize::new(1),
        }
    }

    /// Pool name used as the prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reserve the next thread name
    pub fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }

    /// Spawn `f` on a new thread carrying the next name
    ///
    /// Returns the name together with the handle.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnError`] carrying the reserved name if the
    /// platform refuses to create the thread.
    pub fn spawn<F>(&self, f: F) -> Result<(String, JoinHandle<()>)>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self.next_name();
        match thread::Builder::new().name(name.clone()).spawn(f) {
            Ok(handle) => Ok((name, handle)),
            Err(e) => Err(PoolError::spawn_with_source(name, e)),
        }
    }
}
