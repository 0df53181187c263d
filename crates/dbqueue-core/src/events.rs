//! Event hooks.
//!
//! Callbacks run in registration order and receive the event by mutable
//! reference. After all callbacks ran, the queue reads back the control
//! fields: `handled` on push and before-exec, `retry` on after-error.

use crate::error::ExecError;
use crate::job::Job;
use crate::message::MessageId;

/// Push notification.
pub struct PushEvent<'a> {
    pub kind: &'a str,
    pub job: &'a dyn Job,
    /// Set on after-push only.
    pub id: Option<MessageId>,
    pub ttr: u64,
    pub delay: u64,
    pub priority: i64,
    /// Set on before-push to drop the push; `push` then returns `None`.
    pub handled: bool,
}

/// Execution notification, shared by before-exec, after-exec and after-error.
pub struct ExecEvent<'a> {
    pub id: MessageId,
    /// `None` when the payload could not be decoded.
    pub kind: Option<&'a str>,
    pub job: Option<&'a dyn Job>,
    pub ttr: u64,
    pub attempt: u32,
    /// Set on before-exec to skip execution and release the message.
    pub handled: bool,
    /// Set on after-error.
    pub error: Option<&'a ExecError>,
    /// Retry decision on after-error; hooks may overwrite it.
    pub retry: bool,
}

/// Worker start/stop notification.
pub struct WorkerEvent<'a> {
    pub channel: &'a str,
}

type PushHook = Box<dyn Fn(&mut PushEvent<'_>) + Send + Sync>;
type ExecHook = Box<dyn Fn(&mut ExecEvent<'_>) + Send + Sync>;
type WorkerHook = Box<dyn Fn(&WorkerEvent<'_>) + Send + Sync>;

/// Callback registry, one list per event.
#[derive(Default)]
pub struct QueueEvents {
    before_push: Vec<PushHook>,
    after_push: Vec<PushHook>,
    before_exec: Vec<ExecHook>,
    after_exec: Vec<ExecHook>,
    after_error: Vec<ExecHook>,
    worker_start: Vec<WorkerHook>,
    worker_stop: Vec<WorkerHook>,
}

impl QueueEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_push<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut PushEvent<'_>) + Send + Sync + 'static,
    {
        self.before_push.push(Box::new(f));
        self
    }

    pub fn on_after_push<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut PushEvent<'_>) + Send + Sync + 'static,
    {
        self.after_push.push(Box::new(f));
        self
    }

    pub fn on_before_exec<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut ExecEvent<'_>) + Send + Sync + 'static,
    {
        self.before_exec.push(Box::new(f));
        self
    }

    pub fn on_after_exec<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut ExecEvent<'_>) + Send + Sync + 'static,
    {
        self.after_exec.push(Box::new(f));
        self
    }

    pub fn on_after_error<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut ExecEvent<'_>) + Send + Sync + 'static,
    {
        self.after_error.push(Box::new(f));
        self
    }

    pub fn on_worker_start<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&WorkerEvent<'_>) + Send + Sync + 'static,
    {
        self.worker_start.push(Box::new(f));
        self
    }

    pub fn on_worker_stop<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&WorkerEvent<'_>) + Send + Sync + 'static,
    {
        self.worker_stop.push(Box::new(f));
        self
    }

    pub(crate) fn before_push(&self, event: &mut PushEvent<'_>) {
        for hook in &self.before_push {
            hook(event);
        }
    }

    pub(crate) fn after_push(&self, event: &mut PushEvent<'_>) {
        for hook in &self.after_push {
            hook(event);
        }
    }

    pub(crate) fn before_exec(&self, event: &mut ExecEvent<'_>) {
        for hook in &self.before_exec {
            hook(event);
        }
    }

    pub(crate) fn after_exec(&self, event: &mut ExecEvent<'_>) {
        for hook in &self.after_exec {
            hook(event);
        }
    }

    pub(crate) fn after_error(&self, event: &mut ExecEvent<'_>) {
        for hook in &self.after_error {
            hook(event);
        }
    }

    pub(crate) fn worker_start(&self, event: &WorkerEvent<'_>) {
        for hook in &self.worker_start {
            hook(event);
        }
    }

    pub(crate) fn worker_stop(&self, event: &WorkerEvent<'_>) {
        for hook in &self.worker_stop {
            hook(event);
        }
    }
}
