//! Message dispatch and the retry policy.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ExecError;
use crate::events::ExecEvent;
use crate::job::Job;
use crate::message::ReservedMessage;
use crate::queue::Queue;

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Queue {
    /// Decode and execute a reserved message.
    ///
    /// Returns `true` when the message should be released and `false`
    /// when it stays reserved so the ttr reclaim retries it.
    #[instrument(skip_all, fields(channel = %self.channel, id = %message.id, attempt = message.attempt))]
    pub async fn handle_message(&self, message: &ReservedMessage) -> bool {
        let decoded = self.serializer.deserialize(&message.payload).and_then(|envelope| {
            self.registry
                .decode(&envelope.kind, envelope.data)
                .map(|job| (envelope.kind, job))
        });

        let (kind, job) = match decoded {
            Ok(decoded) => decoded,
            Err(reason) => {
                error!("Message {} has an unreadable payload: {}", message.id, reason);
                let error = ExecError::Protocol(reason);
                return !self.on_error(message, None, None, &error);
            }
        };

        let mut event = ExecEvent {
            id: message.id,
            kind: Some(kind.as_str()),
            job: Some(job.as_ref()),
            ttr: message.ttr,
            attempt: message.attempt,
            handled: false,
            error: None,
            retry: false,
        };
        self.events().before_exec(&mut event);
        if event.handled {
            info!("Execution of message {} handled by hook", message.id);
            return true;
        }

        debug!("Executing '{}' job", kind);
        let outcome = match AssertUnwindSafe(job.execute(self)).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ExecError::Failed(e)),
            Err(panic) => Err(ExecError::Panicked(panic_message(panic))),
        };

        match outcome {
            Ok(()) => {
                let mut event = ExecEvent {
                    id: message.id,
                    kind: Some(kind.as_str()),
                    job: Some(job.as_ref()),
                    ttr: message.ttr,
                    attempt: message.attempt,
                    handled: false,
                    error: None,
                    retry: false,
                };
                self.events().after_exec(&mut event);
                debug!("Job '{}' completed", kind);
                true
            }
            Err(error) => {
                warn!("Job '{}' failed: {}", kind, error);
                !self.on_error(message, Some(kind.as_str()), Some(job.as_ref()), &error)
            }
        }
    }

    /// Decide whether a failed attempt is retried.
    ///
    /// Retryable jobs answer for themselves; everything else, undecodable
    /// payloads included, retries while `attempt < max_attempts`. After-error
    /// hooks see the decision and may overwrite it.
    pub fn on_error(
        &self,
        message: &ReservedMessage,
        kind: Option<&str>,
        job: Option<&dyn Job>,
        error: &ExecError,
    ) -> bool {
        let retry = match job.and_then(|job| job.as_retryable()) {
            Some(retryable) => retryable.can_retry(message.attempt, error),
            None => message.attempt < self.config.max_attempts,
        };

        let mut event = ExecEvent {
            id: message.id,
            kind,
            job,
            ttr: message.ttr,
            attempt: message.attempt,
            handled: false,
            error: Some(error),
            retry,
        };
        self.events().after_error(&mut event);

        if event.retry {
            info!(
                "Message {} will be retried after its ttr of {}s",
                message.id, message.ttr
            );
        } else {
            error!(
                "Message {} gave up after attempt {}: {}",
                message.id, message.attempt, error
            );
        }
        event.retry
    }
}
