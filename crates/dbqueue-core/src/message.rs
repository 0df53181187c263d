//! Message records and their lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned message identifier. Increases with insertion order and is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    /// Not reserved; eligible once its delay has passed.
    Waiting,
    /// Reserved by a worker and not yet released.
    Reserved,
    /// Released, or removed from the store.
    Done,
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageState::Waiting => write!(f, "waiting"),
            MessageState::Reserved => write!(f, "reserved"),
            MessageState::Done => write!(f, "done"),
        }
    }
}

/// A stored message row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel: String,
    pub payload: Vec<u8>,
    pub pushed_at: i64,
    pub ttr: u64,
    pub delay: u64,
    pub priority: i64,
    pub reserved_at: Option<i64>,
    pub done_at: Option<i64>,
    pub attempt: u32,
}

/// Seconds as a signed offset. Values past `i64::MAX` clamp to it.
fn offset(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

impl Message {
    /// Derive the logical state from the timestamps.
    pub fn state(&self) -> MessageState {
        if self.done_at.is_some() {
            MessageState::Done
        } else if self.reserved_at.is_some() {
            MessageState::Reserved
        } else {
            MessageState::Waiting
        }
    }

    /// Whether the delay has elapsed at `now`.
    pub fn is_due(&self, now: i64) -> bool {
        self.pushed_at.saturating_add(offset(self.delay)) <= now
    }

    /// Whether a reservation has outlived its ttr at `now`.
    pub fn is_stale(&self, now: i64) -> bool {
        match (self.reserved_at, self.done_at) {
            (Some(reserved_at), None) => reserved_at < now.saturating_sub(offset(self.ttr)),
            _ => false,
        }
    }
}

/// A message about to be inserted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub channel: String,
    pub payload: Vec<u8>,
    pub pushed_at: i64,
    pub ttr: u64,
    pub delay: u64,
    pub priority: i64,
}

/// What `reserve` hands to the dispatcher.
#[derive(Debug, Clone)]
pub struct ReservedMessage {
    pub id: MessageId,
    pub payload: Vec<u8>,
    pub ttr: u64,
    pub attempt: u32,
}

/// Per-push overrides of the queue defaults.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub ttr: Option<u64>,
    pub delay: u64,
    pub priority: Option<i64>,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set time-to-reserve in seconds.
    pub fn with_ttr(mut self, ttr: u64) -> Self {
        self.ttr = Some(ttr);
        self
    }

    /// Set delay in seconds.
    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    /// Set priority. Lower runs first.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Row counts of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: u64,
    pub delayed: u64,
    pub reserved: u64,
    pub done: u64,
}
