//! Worker loops: drain once, or listen until cancelled.

use std::ops::AddAssign;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::events::WorkerEvent;
use crate::queue::Queue;

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;

/// Counts of one `run` or `listen` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Messages reserved and handed to the dispatcher.
    pub processed: u64,
    /// Messages released after handling.
    pub released: u64,
    /// Messages left reserved for a retry.
    pub retried: u64,
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.released += other.released;
        self.retried += other.retried;
    }
}

/// Drives reserve, dispatch and release for one queue.
pub struct Worker {
    queue: Arc<Queue>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl Worker {
    /// Create a worker stopped by `shutdown`.
    pub fn new(queue: Arc<Queue>, shutdown: CancellationToken) -> Self {
        Self {
            queue,
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Check if a loop is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request the loop to stop after the current message.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Process messages until none is eligible, then return.
    pub async fn run(&self) -> Result<RunSummary, QueueError> {
        self.start();
        let result = self.drain().await;
        self.finish(&result);
        result
    }

    /// Drain repeatedly, sleeping `delay` between passes, until cancelled.
    ///
    /// A zero delay returns after the first pass that finds nothing. Lock
    /// timeouts only end the current pass.
    pub async fn listen(&self, delay: Duration) -> Result<RunSummary, QueueError> {
        self.start();

        let mut total = RunSummary::default();
        let result = loop {
            if self.shutdown.is_cancelled() {
                break Ok(total);
            }

            match self.drain().await {
                Ok(summary) => total += summary,
                Err(e) if e.is_transient() => {
                    warn!("Pass on channel '{}' interrupted: {}", self.queue.channel(), e);
                }
                Err(e) => break Err(e),
            }

            if delay.is_zero() {
                break Ok(total);
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        };

        self.finish(&result);
        result
    }

    async fn drain(&self) -> Result<RunSummary, QueueError> {
        let mut summary = RunSummary::default();

        while !self.shutdown.is_cancelled() {
            let Some(message) = self.queue.reserve().await? else {
                break;
            };
            summary.processed += 1;

            if self.queue.handle_message(&message).await {
                self.queue.release(message.id).await?;
                summary.released += 1;
            } else {
                summary.retried += 1;
            }
        }

        debug!(
            "Pass on channel '{}' done: {} processed",
            self.queue.channel(),
            summary.processed
        );
        Ok(summary)
    }

    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!("Worker started on channel '{}'", self.queue.channel());
        self.queue.events().worker_start(&WorkerEvent {
            channel: self.queue.channel(),
        });
    }

    fn finish(&self, result: &Result<RunSummary, QueueError>) {
        self.queue.events().worker_stop(&WorkerEvent {
            channel: self.queue.channel(),
        });
        self.running.store(false, Ordering::SeqCst);
        match result {
            Ok(summary) => info!(
                "Worker stopped on channel '{}': {} processed, {} released, {} retried",
                self.queue.channel(),
                summary.processed,
                summary.released,
                summary.retried
            ),
            Err(e) => warn!("Worker stopped on channel '{}': {}", self.queue.channel(), e),
        }
    }
}
