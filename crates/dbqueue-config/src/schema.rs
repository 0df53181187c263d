//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Queue behaviour shared by producers and workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Logical sub-queue this process pushes to and consumes from.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Default time-to-reserve for pushed messages.
    #[serde(default = "default_ttr")]
    pub ttr_secs: u64,

    /// Attempts allowed for jobs without their own retry policy.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// How long a reserve call waits for the channel lock.
    #[serde(default = "default_mutex_timeout")]
    pub mutex_timeout_secs: u64,

    /// Delete released rows (true) or keep them with `done_at` set (false).
    #[serde(default = "default_true")]
    pub delete_released: bool,

    /// Priority used when a push does not set one. Lower runs first.
    #[serde(default = "default_priority")]
    pub default_priority: i64,
}

fn default_channel() -> String {
    "queue".to_string()
}

fn default_ttr() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    1
}

fn default_mutex_timeout() -> u64 {
    3
}

fn default_priority() -> i64 {
    1024
}

fn default_true() -> bool {
    true
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            ttr_secs: default_ttr(),
            max_attempts: default_max_attempts(),
            mutex_timeout_secs: default_mutex_timeout(),
            delete_released: default_true(),
            default_priority: default_priority(),
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Sqlite => write!(f, "sqlite"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Message store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file, `~` is expanded.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Lease on a lock row, after which a crashed holder's lock is taken over.
    #[serde(default = "default_mutex_lease")]
    pub mutex_lease_secs: u64,
}

fn default_db_path() -> String {
    "~/.dbqueue/queue.db".to_string()
}

fn default_mutex_lease() -> u64 {
    60
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
            mutex_lease_secs: default_mutex_lease(),
        }
    }
}

/// Worker loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Pause between polling rounds in `listen`.
    #[serde(default = "default_listen_delay")]
    pub listen_delay_secs: u64,
}

fn default_listen_delay() -> u64 {
    3
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen_delay_secs: default_listen_delay(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines on the console instead of text.
    #[serde(default)]
    pub json: bool,

    /// Directory for daily-rotated log files. Console only when unset.
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}
