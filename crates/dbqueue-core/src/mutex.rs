//! Named advisory locks guarding the reservation step.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::QueueError;

/// Named lock with bounded acquisition.
///
/// Locks are not reentrant: a second `acquire` of a held key waits for the
/// timeout even when it comes from the same holder.
#[async_trait]
pub trait QueueMutex: Send + Sync {
    /// Wait up to `timeout` for `key`. Returns false on timeout.
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<bool, QueueError>;

    /// Release `key`. Returns false if this holder did not hold it.
    async fn release(&self, key: &str) -> Result<bool, QueueError>;
}

/// An acquired key, released when the guard goes away.
///
/// [`LockGuard::release`] is the normal path. A guard dropped while still
/// holding its key, by a panic or a cancelled future, spawns the release
/// onto the current runtime.
pub(crate) struct LockGuard {
    mutex: Arc<dyn QueueMutex>,
    key: Option<String>,
}

impl LockGuard {
    pub(crate) fn new(mutex: Arc<dyn QueueMutex>, key: String) -> Self {
        Self {
            mutex,
            key: Some(key),
        }
    }

    /// Release the key now. Returns false if it was no longer held.
    pub(crate) async fn release(mut self) -> Result<bool, QueueError> {
        let released = match &self.key {
            Some(key) => self.mutex.release(key).await,
            None => Ok(false),
        };
        self.key = None;
        released
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Lock '{}' left held: no runtime to release it", key);
            return;
        };

        warn!("Releasing lock '{}' after an interrupted reservation", key);
        let mutex = self.mutex.clone();
        handle.spawn(async move {
            if let Err(e) = mutex.release(&key).await {
                warn!("Failed to release lock '{}': {}", key, e);
            }
        });
    }
}

/// Process-local lock set.
#[derive(Default)]
pub struct MemoryMutex {
    held: Mutex<HashSet<String>>,
    released: Notify,
}

impl MemoryMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if `key` is currently held.
    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }
}

#[async_trait]
impl QueueMutex for MemoryMutex {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<bool, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Registered before the check so a release in between is not missed.
            let released = self.released.notified();
            if self.held.lock().insert(key.to_string()) {
                debug!("Acquired lock '{}'", key);
                return Ok(true);
            }
            if tokio::time::timeout_at(deadline, released).await.is_err() {
                debug!("Timed out waiting for lock '{}'", key);
                return Ok(false);
            }
        }
    }

    async fn release(&self, key: &str) -> Result<bool, QueueError> {
        let removed = self.held.lock().remove(key);
        if removed {
            self.released.notify_waiters();
        }
        Ok(removed)
    }
}
