//! Queue errors.

use thiserror::Error;

use crate::message::MessageId;

/// Infrastructure and API errors raised by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The channel lock was not acquired within the configured timeout.
    #[error("Timed out waiting for lock '{0}'")]
    LockTimeout(String),

    /// Message store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// A job could not be encoded for storage.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Push of a job kind the registry does not know.
    #[error("Job kind '{0}' is not registered")]
    UnknownJobKind(String),

    /// A ttr, delay or priority the store cannot represent.
    #[error("Invalid push option: {0}")]
    InvalidOption(String),

    /// Status query for an id the store never issued.
    #[error("Unknown message id: {0}")]
    UnknownMessage(MessageId),
}

impl QueueError {
    /// Whether a worker pass may simply be retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::LockTimeout(_))
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Serialization(e.to_string())
    }
}

/// Failure of a single message's execution. Never stops a worker.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The job returned an error.
    #[error("Job failed: {0:#}")]
    Failed(anyhow::Error),

    /// The job panicked.
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The stored payload does not decode to a registered job.
    #[error("Invalid payload: {0}")]
    Protocol(String),
}
