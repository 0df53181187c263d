//! Message persistence.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::QueueError;
use crate::message::{Message, MessageId, NewMessage, QueueStats};

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

/// Message store trait.
///
/// Implementations only apply the predicates given; they make no
/// scheduling decisions of their own.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message and return its new id.
    async fn insert(&self, message: NewMessage) -> Result<MessageId, QueueError>;

    /// Load a message by id.
    async fn get(&self, id: MessageId) -> Result<Option<Message>, QueueError>;

    /// Record a reservation.
    async fn update_reservation(
        &self,
        id: MessageId,
        reserved_at: i64,
        attempt: u32,
    ) -> Result<(), QueueError>;

    /// Keep the row but mark it done.
    async fn mark_done(&self, id: MessageId, done_at: i64) -> Result<(), QueueError>;

    /// Remove the row. Returns whether it existed.
    async fn delete(&self, id: MessageId) -> Result<bool, QueueError>;

    /// Return every reservation older than its ttr at `now` to waiting, across all channels.
    async fn unreserve_expired(&self, now: i64) -> Result<u64, QueueError>;

    /// Next waiting message of `channel` whose delay has passed,
    /// by ascending priority then ascending id.
    async fn select_next_eligible(
        &self,
        channel: &str,
        now: i64,
    ) -> Result<Option<Message>, QueueError>;

    /// Highest id ever issued, including ids of deleted rows.
    async fn last_issued_id(&self) -> Result<Option<MessageId>, QueueError>;

    /// Remove every row of a channel.
    async fn clear(&self, channel: &str) -> Result<u64, QueueError>;

    /// Row counts of a channel at `now`.
    async fn stats(&self, channel: &str, now: i64) -> Result<QueueStats, QueueError>;
}

#[derive(Default)]
struct MemoryInner {
    rows: BTreeMap<MessageId, Message>,
    last_id: i64,
}

/// In-memory message store for tests and single-process use.
#[derive(Default)]
pub struct MemoryMessageStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryMessageStore {
    /// Create a new memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows, done rows included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    /// Check if the store holds no rows.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.rows.is_empty()
    }
}

fn not_found(id: MessageId) -> QueueError {
    QueueError::Store(format!("message {} not found", id))
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<MessageId, QueueError> {
        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let id = MessageId(inner.last_id);
        inner.rows.insert(
            id,
            Message {
                id,
                channel: message.channel,
                payload: message.payload,
                pushed_at: message.pushed_at,
                ttr: message.ttr,
                delay: message.delay,
                priority: message.priority,
                reserved_at: None,
                done_at: None,
                attempt: 0,
            },
        );
        Ok(id)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, QueueError> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn update_reservation(
        &self,
        id: MessageId,
        reserved_at: i64,
        attempt: u32,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.write().await;
        let row = inner.rows.get_mut(&id).ok_or_else(|| not_found(id))?;
        row.reserved_at = Some(reserved_at);
        row.attempt = attempt;
        Ok(())
    }

    async fn mark_done(&self, id: MessageId, done_at: i64) -> Result<(), QueueError> {
        let mut inner = self.inner.write().await;
        let row = inner.rows.get_mut(&id).ok_or_else(|| not_found(id))?;
        row.done_at = Some(done_at);
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<bool, QueueError> {
        Ok(self.inner.write().await.rows.remove(&id).is_some())
    }

    async fn unreserve_expired(&self, now: i64) -> Result<u64, QueueError> {
        let mut inner = self.inner.write().await;
        let mut count = 0;
        for row in inner.rows.values_mut().filter(|row| row.is_stale(now)) {
            row.reserved_at = None;
            count += 1;
        }
        Ok(count)
    }

    async fn select_next_eligible(
        &self,
        channel: &str,
        now: i64,
    ) -> Result<Option<Message>, QueueError> {
        let inner = self.inner.read().await;
        // BTreeMap iterates by ascending id, so min_by_key keeps the oldest on ties.
        Ok(inner
            .rows
            .values()
            .filter(|row| {
                row.channel == channel
                    && row.reserved_at.is_none()
                    && row.done_at.is_none()
                    && row.is_due(now)
            })
            .min_by_key(|row| (row.priority, row.id))
            .cloned())
    }

    async fn last_issued_id(&self) -> Result<Option<MessageId>, QueueError> {
        let inner = self.inner.read().await;
        Ok((inner.last_id > 0).then_some(MessageId(inner.last_id)))
    }

    async fn clear(&self, channel: &str) -> Result<u64, QueueError> {
        let mut inner = self.inner.write().await;
        let before = inner.rows.len();
        inner.rows.retain(|_, row| row.channel != channel);
        Ok((before - inner.rows.len()) as u64)
    }

    async fn stats(&self, channel: &str, now: i64) -> Result<QueueStats, QueueError> {
        let inner = self.inner.read().await;
        let mut stats = QueueStats::default();
        for row in inner.rows.values().filter(|row| row.channel == channel) {
            if row.done_at.is_some() {
                stats.done += 1;
            } else if row.reserved_at.is_some() {
                stats.reserved += 1;
            } else if row.is_due(now) {
                stats.waiting += 1;
            } else {
                stats.delayed += 1;
            }
        }
        Ok(stats)
    }
}
