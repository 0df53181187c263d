//! Jobs and wiring shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use dbqueue_config::QueueConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::ManualClock;
use crate::error::ExecError;
use crate::events::QueueEvents;
use crate::job::{Job, JobKind, RetryableJob};
use crate::message::MessageId;
use crate::mutex::MemoryMutex;
use crate::queue::Queue;
use crate::registry::JobRegistry;
use crate::store::MemoryMessageStore;

pub const START: i64 = 1_700_000_000;

#[derive(Serialize, Deserialize)]
pub struct Noop {
    pub tag: String,
}

#[async_trait]
impl Job for Noop {
    async fn execute(&self, _queue: &Queue) -> anyhow::Result<()> {
        Ok(())
    }
}

impl JobKind for Noop {
    const KIND: &'static str = "noop";
}

#[derive(Serialize, Deserialize)]
pub struct Fail {
    pub reason: String,
}

#[async_trait]
impl Job for Fail {
    async fn execute(&self, _queue: &Queue) -> anyhow::Result<()> {
        anyhow::bail!("{}", self.reason)
    }
}

impl JobKind for Fail {
    const KIND: &'static str = "fail";
}

#[derive(Serialize, Deserialize)]
pub struct Panic;

#[async_trait]
impl Job for Panic {
    async fn execute(&self, _queue: &Queue) -> anyhow::Result<()> {
        panic!("boom");
    }
}

impl JobKind for Panic {
    const KIND: &'static str = "panic";
}

/// Always fails; retries while `attempt < attempts`.
#[derive(Serialize, Deserialize)]
pub struct Flaky {
    pub attempts: u32,
    pub ttr: u64,
}

#[async_trait]
impl Job for Flaky {
    async fn execute(&self, _queue: &Queue) -> anyhow::Result<()> {
        anyhow::bail!("flaky")
    }

    fn as_retryable(&self) -> Option<&dyn RetryableJob> {
        Some(self)
    }
}

impl RetryableJob for Flaky {
    fn ttr(&self) -> u64 {
        self.ttr
    }

    fn can_retry(&self, attempt: u32, _error: &ExecError) -> bool {
        attempt < self.attempts
    }
}

impl JobKind for Flaky {
    const KIND: &'static str = "flaky";
}

/// Pushes a `Noop` with the given tag.
#[derive(Serialize, Deserialize)]
pub struct Chain {
    pub next: String,
}

#[async_trait]
impl Job for Chain {
    async fn execute(&self, queue: &Queue) -> anyhow::Result<()> {
        queue
            .push(&Noop {
                tag: self.next.clone(),
            })
            .await?;
        Ok(())
    }
}

impl JobKind for Chain {
    const KIND: &'static str = "chain";
}

pub fn registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry
        .register::<Noop>()
        .register::<Fail>()
        .register::<Panic>()
        .register::<Flaky>()
        .register::<Chain>();
    registry
}

pub fn noop(tag: &str) -> Noop {
    Noop {
        tag: tag.to_string(),
    }
}

/// Record the ids passed to after-exec, in order.
pub fn record_executions(events: &mut QueueEvents) -> Arc<Mutex<Vec<MessageId>>> {
    let executed = Arc::new(Mutex::new(Vec::new()));
    let sink = executed.clone();
    events.on_after_exec(move |event| sink.lock().push(event.id));
    executed
}

pub struct Harness {
    pub queue: Arc<Queue>,
    pub store: Arc<MemoryMessageStore>,
    pub mutex: Arc<MemoryMutex>,
    pub clock: Arc<ManualClock>,
}

pub fn harness_with(config: QueueConfig, events: QueueEvents) -> Harness {
    let store = Arc::new(MemoryMessageStore::new());
    let mutex = Arc::new(MemoryMutex::new());
    let clock = Arc::new(ManualClock::new(START));
    let queue = Queue::builder(config, store.clone(), mutex.clone())
        .with_registry(registry())
        .with_events(events)
        .with_clock(clock.clone())
        .build();
    Harness {
        queue: Arc::new(queue),
        store,
        mutex,
        clock,
    }
}

pub fn harness() -> Harness {
    harness_with(QueueConfig::default(), QueueEvents::new())
}
