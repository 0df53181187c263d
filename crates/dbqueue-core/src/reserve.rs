//! Reservation under the channel lock.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::message::ReservedMessage;
use crate::mutex::LockGuard;
use crate::queue::Queue;

#[cfg(test)]
#[path = "reserve_tests.rs"]
mod tests;

impl Queue {
    /// Reserve the next eligible message of the channel.
    ///
    /// Holds the channel lock for the whole step and releases it on every
    /// path, including a panic in the store or a dropped future. Fails with [`QueueError::LockTimeout`] when the lock cannot be
    /// taken within the configured timeout.
    pub async fn reserve(&self) -> Result<Option<ReservedMessage>, QueueError> {
        let key = self.mutex_key();
        let timeout = Duration::from_secs(self.config.mutex_timeout_secs);

        if !self.mutex.acquire(&key, timeout).await? {
            warn!("Could not acquire lock '{}' within {:?}", key, timeout);
            return Err(QueueError::LockTimeout(key));
        }

        let guard = LockGuard::new(self.mutex.clone(), key.clone());
        let result = self.reserve_locked().await;

        match guard.release().await {
            Ok(true) => {}
            Ok(false) => warn!("Lock '{}' was no longer held at release", key),
            Err(e) if result.is_ok() => return Err(e),
            Err(e) => warn!("Failed to release lock '{}': {}", key, e),
        }

        result
    }

    async fn reserve_locked(&self) -> Result<Option<ReservedMessage>, QueueError> {
        let now = self.clock.now();
        self.reclaim_expired(now).await?;

        let Some(message) = self.store.select_next_eligible(&self.channel, now).await? else {
            return Ok(None);
        };

        let attempt = message.attempt + 1;
        self.store
            .update_reservation(message.id, now, attempt)
            .await?;

        debug!(
            "Reserved message {} on channel '{}' (attempt {})",
            message.id, self.channel, attempt
        );

        Ok(Some(ReservedMessage {
            id: message.id,
            payload: message.payload,
            ttr: message.ttr,
            attempt,
        }))
    }

    /// Return expired reservations to waiting, at most once per second.
    async fn reclaim_expired(&self, now: i64) -> Result<(), QueueError> {
        if self.last_reclaim.load(Ordering::Acquire) == now {
            return Ok(());
        }

        let count = self.store.unreserve_expired(now).await?;
        self.last_reclaim.store(now, Ordering::Release);

        if count > 0 {
            info!("Reclaimed {} expired reservations", count);
        }
        Ok(())
    }
}
