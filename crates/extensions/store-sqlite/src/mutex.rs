//! Lock rows in the `queue_mutex` table.
//!
//! Each lock is one row keyed by name and stamped with the holder's token
//! and a lease expiry. An expired row can be taken over by anyone, so a
//! crashed holder blocks the channel for at most one lease.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::params;
use tokio::time::Instant;
use tokio_rusqlite::Connection;
use tracing::debug;

use dbqueue_core::{Clock, QueueError, QueueMutex, SystemClock};

use crate::store::store_error;

#[cfg(test)]
#[path = "mutex_tests.rs"]
mod tests;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Database lock shared by every process using the same file.
pub struct SqliteMutex {
    conn: Connection,
    owner: String,
    lease: Duration,
    clock: Arc<dyn Clock>,
}

impl SqliteMutex {
    /// Create a lock holder with its own owner token.
    pub fn new(conn: Connection, lease: Duration) -> Self {
        Self {
            conn,
            owner: uuid::Uuid::new_v4().to_string(),
            lease,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use another clock for lease arithmetic.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Owner token written into held rows.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    async fn try_acquire(&self, key: &str) -> Result<bool, QueueError> {
        let name = key.to_string();
        let owner = self.owner.clone();
        let now = self.clock.now();
        let lease = i64::try_from(self.lease.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(lease);

        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO queue_mutex (name, owner, acquired_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(name) DO UPDATE SET
                         owner = excluded.owner,
                         acquired_at = excluded.acquired_at,
                         expires_at = excluded.expires_at
                     WHERE queue_mutex.expires_at < excluded.acquired_at",
                    params![name, owner, now, expires_at],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl QueueMutex for SqliteMutex {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<bool, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire(key).await? {
                debug!("Acquired lock '{}' as {}", key, self.owner);
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Timed out waiting for lock '{}'", key);
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn release(&self, key: &str) -> Result<bool, QueueError> {
        let name = key.to_string();
        let owner = self.owner.clone();
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM queue_mutex WHERE name = ?1 AND owner = ?2",
                    params![name, owner],
                )?;
                Ok(changed > 0)
            })
            .await
            .map_err(store_error)
    }
}
