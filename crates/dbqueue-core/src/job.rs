//! Job contracts.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ExecError;
use crate::queue::Queue;

/// Unit of work carried by a message.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Run the job. The queue handle allows pushing follow-up work.
    async fn execute(&self, queue: &Queue) -> anyhow::Result<()>;

    /// Expose the retry capability, if the job has its own policy.
    fn as_retryable(&self) -> Option<&dyn RetryableJob> {
        None
    }
}

/// Job that decides its own reservation timeout and retries.
pub trait RetryableJob: Send + Sync {
    /// Time-to-reserve used when the job is pushed without an explicit ttr.
    fn ttr(&self) -> u64;

    /// Whether a failed attempt should be retried.
    fn can_retry(&self, attempt: u32, error: &ExecError) -> bool;
}

/// A job type that can be stored: a stable kind tag plus serde.
pub trait JobKind: Job + Serialize + DeserializeOwned {
    /// Tag persisted with the payload and used to pick the decoder.
    const KIND: &'static str;
}
