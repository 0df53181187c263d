//! CLI definitions for dbqueue.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dbqueue CLI.
#[derive(Parser)]
#[command(name = "dbqueue")]
#[command(about = "Database-backed job queue")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/dbqueue.toml", global = true)]
    pub config: PathBuf,

    /// Channel to operate on, overriding the configured one
    #[arg(long, env = "DBQUEUE_CHANNEL", global = true)]
    pub channel: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Process waiting jobs, then exit
    Run,

    /// Process jobs until interrupted
    Listen {
        /// Seconds to sleep when the queue is empty (0 exits when empty)
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Push a job
    Push {
        /// Registered job kind
        kind: String,

        /// Job fields as a JSON object
        #[arg(default_value = "{}")]
        data: String,

        /// Time-to-reserve in seconds
        #[arg(long)]
        ttr: Option<u64>,

        /// Delay in seconds before the job becomes eligible
        #[arg(long, default_value_t = 0)]
        delay: u64,

        /// Priority, lower runs first
        #[arg(long)]
        priority: Option<i64>,
    },

    /// Show the state of a message
    Status {
        /// Message id
        id: i64,
    },

    /// Show channel statistics and registered job kinds
    Info,

    /// Remove a message regardless of its state
    Remove {
        /// Message id
        id: i64,
    },

    /// Remove every message of the channel
    Clear,
}
