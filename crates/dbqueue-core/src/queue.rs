//! Queue handle: push, status and release on one channel of a shared store.

use std::sync::Arc;
use std::sync::atomic::AtomicI64;

use dbqueue_config::QueueConfig;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::QueueError;
use crate::events::{PushEvent, QueueEvents};
use crate::job::{Job, JobKind};
use crate::message::{MessageId, MessageState, NewMessage, PushOptions, QueueStats};
use crate::mutex::QueueMutex;
use crate::registry::JobRegistry;
use crate::serializer::{JobEnvelope, JsonSerializer, PayloadSerializer};
use crate::store::MessageStore;

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Reject second counts the store cannot hold as signed integers.
fn check_seconds(name: &str, secs: u64) -> Result<(), QueueError> {
    if i64::try_from(secs).is_err() {
        return Err(QueueError::InvalidOption(format!(
            "{} of {}s exceeds {}s",
            name,
            secs,
            i64::MAX
        )));
    }
    Ok(())
}

/// Job queue bound to one channel.
///
/// Cheap to derive for other channels with [`Queue::for_channel`]; all
/// derived queues share the store, lock, registry and hooks.
pub struct Queue {
    pub(crate) channel: String,
    pub(crate) config: QueueConfig,
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) mutex: Arc<dyn QueueMutex>,
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) serializer: Arc<dyn PayloadSerializer>,
    pub(crate) events: Arc<QueueEvents>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Second in which expired reservations were last reclaimed.
    pub(crate) last_reclaim: AtomicI64,
}

/// Builder for [`Queue`].
pub struct QueueBuilder {
    config: QueueConfig,
    store: Arc<dyn MessageStore>,
    mutex: Arc<dyn QueueMutex>,
    registry: JobRegistry,
    serializer: Arc<dyn PayloadSerializer>,
    events: QueueEvents,
    clock: Arc<dyn Clock>,
}

impl QueueBuilder {
    /// Use a job registry.
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use hooks.
    pub fn with_events(mut self, events: QueueEvents) -> Self {
        self.events = events;
        self
    }

    /// Use a payload serializer other than JSON.
    pub fn with_serializer(mut self, serializer: Arc<dyn PayloadSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Use a clock other than the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the configured channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.config.channel = channel.into();
        self
    }

    pub fn build(self) -> Queue {
        Queue {
            channel: self.config.channel.clone(),
            config: self.config,
            store: self.store,
            mutex: self.mutex,
            registry: Arc::new(self.registry),
            serializer: self.serializer,
            events: Arc::new(self.events),
            clock: self.clock,
            last_reclaim: AtomicI64::new(i64::MIN),
        }
    }
}

impl Queue {
    /// Start building a queue over a store and a lock.
    pub fn builder(
        config: QueueConfig,
        store: Arc<dyn MessageStore>,
        mutex: Arc<dyn QueueMutex>,
    ) -> QueueBuilder {
        QueueBuilder {
            config,
            store,
            mutex,
            registry: JobRegistry::new(),
            serializer: Arc::new(JsonSerializer),
            events: QueueEvents::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// A queue on another channel sharing this queue's resources.
    pub fn for_channel(&self, channel: impl Into<String>) -> Queue {
        let channel = channel.into();
        let mut config = self.config.clone();
        config.channel = channel.clone();
        Queue {
            channel,
            config,
            store: self.store.clone(),
            mutex: self.mutex.clone(),
            registry: self.registry.clone(),
            serializer: self.serializer.clone(),
            events: self.events.clone(),
            clock: self.clock.clone(),
            last_reclaim: AtomicI64::new(i64::MIN),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub(crate) fn events(&self) -> &QueueEvents {
        &self.events
    }

    pub(crate) fn mutex_key(&self) -> String {
        format!("dbqueue:{}", self.channel)
    }

    /// Push a job with the queue defaults.
    ///
    /// Returns `None` when a before-push hook handled the push.
    pub async fn push<J: JobKind>(&self, job: &J) -> Result<Option<MessageId>, QueueError> {
        self.push_with(job, PushOptions::default()).await
    }

    /// Push a job with explicit ttr, delay or priority.
    pub async fn push_with<J: JobKind>(
        &self,
        job: &J,
        options: PushOptions,
    ) -> Result<Option<MessageId>, QueueError> {
        let data = serde_json::to_value(job)?;
        self.push_job(J::KIND, job, data, options).await
    }

    /// Push a registered job kind given as JSON fields.
    pub async fn push_json(
        &self,
        kind: &str,
        data: serde_json::Value,
        options: PushOptions,
    ) -> Result<Option<MessageId>, QueueError> {
        if !self.registry.contains(kind) {
            return Err(QueueError::UnknownJobKind(kind.to_string()));
        }
        let job = self
            .registry
            .decode(kind, data.clone())
            .map_err(QueueError::Serialization)?;
        self.push_job(kind, job.as_ref(), data, options).await
    }

    async fn push_job(
        &self,
        kind: &str,
        job: &dyn Job,
        data: serde_json::Value,
        options: PushOptions,
    ) -> Result<Option<MessageId>, QueueError> {
        let ttr = options
            .ttr
            .or_else(|| job.as_retryable().map(|retryable| retryable.ttr()))
            .unwrap_or(self.config.ttr_secs);

        let mut event = PushEvent {
            kind,
            job,
            id: None,
            ttr,
            delay: options.delay,
            priority: options.priority.unwrap_or(self.config.default_priority),
            handled: false,
        };
        self.events.before_push(&mut event);
        if event.handled {
            debug!("Push of '{}' job handled by hook", kind);
            return Ok(None);
        }
        let (ttr, delay, priority) = (event.ttr, event.delay, event.priority);
        check_seconds("ttr", ttr)?;
        check_seconds("delay", delay)?;

        let payload = self
            .serializer
            .serialize(&JobEnvelope {
                kind: kind.to_string(),
                data,
            })
            .map_err(QueueError::Serialization)?;

        let id = self
            .store
            .insert(NewMessage {
                channel: self.channel.clone(),
                payload,
                pushed_at: self.clock.now(),
                ttr,
                delay,
                priority,
            })
            .await?;

        debug!(
            "Pushed '{}' job as message {} (channel: {}, ttr: {}, delay: {}, priority: {})",
            kind, id, self.channel, ttr, delay, priority
        );

        let mut event = PushEvent {
            kind,
            job,
            id: Some(id),
            ttr,
            delay,
            priority,
            handled: false,
        };
        self.events.after_push(&mut event);

        Ok(Some(id))
    }

    /// Logical state of a message.
    ///
    /// Ids are never reused, so an absent id at or below the last issued id
    /// belonged to a released or removed message and reports `Done`. Ids
    /// above it were never issued and fail with `UnknownMessage`.
    pub async fn status(&self, id: MessageId) -> Result<MessageState, QueueError> {
        if let Some(message) = self.store.get(id).await? {
            return Ok(message.state());
        }
        match self.store.last_issued_id().await? {
            Some(last) if id.0 > 0 && id <= last => Ok(MessageState::Done),
            _ => Err(QueueError::UnknownMessage(id)),
        }
    }

    /// Mark a message done: delete it, or stamp `done_at` when released rows are kept.
    pub async fn release(&self, id: MessageId) -> Result<(), QueueError> {
        if self.config.delete_released {
            self.store.delete(id).await?;
        } else {
            self.store.mark_done(id, self.clock.now()).await?;
        }
        debug!("Released message {}", id);
        Ok(())
    }

    /// Drop a message regardless of its state.
    pub async fn remove(&self, id: MessageId) -> Result<bool, QueueError> {
        let removed = self.store.delete(id).await?;
        if removed {
            info!("Removed message {}", id);
        }
        Ok(removed)
    }

    /// Drop every message of this channel.
    pub async fn clear(&self) -> Result<u64, QueueError> {
        let count = self.store.clear(&self.channel).await?;
        info!("Cleared {} messages from channel '{}'", count, self.channel);
        Ok(count)
    }

    /// Row counts of this channel.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.store.stats(&self.channel, self.clock.now()).await
    }
}
