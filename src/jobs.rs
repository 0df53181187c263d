//! Job kinds available from the command line.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use dbqueue_core::{ExecError, Job, JobKind, JobRegistry, Queue, RetryableJob};

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;

/// Registry with every job kind the binary can execute.
pub(crate) fn registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register::<LogJob>().register::<ShellJob>();
    registry
}

/// Route a ttr override into job kinds that bound their own run time.
///
/// A shell job times out on its `ttr` field, so an override is written
/// there and the message ttr follows from the job. Other kinds keep the
/// override as the message ttr.
pub(crate) fn apply_ttr(
    kind: &str,
    data: &mut serde_json::Value,
    ttr: Option<u64>,
) -> Option<u64> {
    match (ttr, data.as_object_mut()) {
        (Some(ttr), Some(fields)) if kind == ShellJob::KIND => {
            fields.insert("ttr".to_string(), ttr.into());
            None
        }
        _ => ttr,
    }
}

/// Writes a message to the log.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LogJob {
    pub message: String,
    #[serde(default)]
    pub warn: bool,
}

#[async_trait]
impl Job for LogJob {
    async fn execute(&self, _queue: &Queue) -> anyhow::Result<()> {
        if self.warn {
            warn!("{}", self.message);
        } else {
            info!("{}", self.message);
        }
        Ok(())
    }
}

impl JobKind for LogJob {
    const KIND: &'static str = "log";
}

/// Runs a shell command. Fails on a non-zero exit or when it outlives its ttr.
///
/// Pushed with its own ttr as the message ttr, so the timeout ends the
/// command before the reservation expires.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ShellJob {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default = "default_ttr")]
    pub ttr: u64,
    /// Total attempts, first run included.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_ttr() -> u64 {
    300
}

fn default_attempts() -> u32 {
    1
}

#[async_trait]
impl Job for ShellJob {
    async fn execute(&self, _queue: &Queue) -> anyhow::Result<()> {
        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(&self.command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let output = timeout(Duration::from_secs(self.ttr), cmd.output())
            .await
            .with_context(|| format!("command timed out after {}s", self.ttr))?
            .with_context(|| format!("failed to spawn '{}'", self.command))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!("{}", stdout.trim_end());
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("exit code {}: {}", code, stderr.trim_end());
        }
        Ok(())
    }

    fn as_retryable(&self) -> Option<&dyn RetryableJob> {
        Some(self)
    }
}

impl RetryableJob for ShellJob {
    fn ttr(&self) -> u64 {
        self.ttr
    }

    fn can_retry(&self, attempt: u32, _error: &ExecError) -> bool {
        attempt < self.attempts
    }
}

impl JobKind for ShellJob {
    const KIND: &'static str = "shell";
}
