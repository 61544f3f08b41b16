//! Collapses overlapping triggers into a single running execution.
//!
//! A trigger that finds the guard held is dropped rather than queued. The
//! permit is released when it goes out of scope.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct DebounceGuard {
    inner: Arc<Mutex<()>>,
}

/// Held for the duration of one execution.
#[derive(Debug)]
pub struct DebouncePermit {
    _guard: OwnedMutexGuard<()>,
}

impl DebounceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a permit if nothing is running, `None` otherwise.
    pub fn try_acquire(&self) -> Option<DebouncePermit> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .ok()
            .map(|guard| DebouncePermit { _guard: guard })
    }

    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Waits until the current holder (if any) releases its permit.
    pub async fn wait_idle(&self) {
        let _ = self.inner.lock().await;
    }
}
