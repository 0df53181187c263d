//! # dbqueue core
//!
//! Database-backed job queue.
//!
//! ## Features
//!
//! - Push with ttr, delay and priority
//! - Mutually exclusive reservation per channel
//! - Reclaim of reservations that outlive their ttr
//! - Retry policy with per-job override
//! - Event hooks around push, execution and workers
//! - Run-once and listen worker loops

pub mod clock;
mod dispatch;
pub mod error;
pub mod events;
pub mod job;
pub mod message;
pub mod mutex;
pub mod queue;
pub mod registry;
mod reserve;
pub mod serializer;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ExecError, QueueError};
pub use events::{ExecEvent, PushEvent, QueueEvents, WorkerEvent};
pub use job::{Job, JobKind, RetryableJob};
pub use message::{
    Message, MessageId, MessageState, NewMessage, PushOptions, QueueStats, ReservedMessage,
};
pub use mutex::{MemoryMutex, QueueMutex};
pub use queue::{Queue, QueueBuilder};
pub use registry::JobRegistry;
pub use serializer::{JobEnvelope, JsonSerializer, PayloadSerializer};
pub use store::{MemoryMessageStore, MessageStore};
pub use worker::{RunSummary, Worker};

pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
