//! dbqueue - database-backed job queue
//!
//! Command line producer and worker.

mod cli;
mod jobs;
mod signal;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use dbqueue_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig, StoreBackend};
use dbqueue_core::{
    CancellationToken, MemoryMessageStore, MemoryMutex, MessageId, PushOptions, Queue,
    QueueEvents, Worker,
};
use dbqueue_store_sqlite::SqliteMessageStore;

use crate::cli::{Cli, Commands};

fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // Keep the writer guard alive for the program duration
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();

    let file_layer = match &config.dir {
        Some(dir) => {
            let log_dir = ConfigLoader::expand_path(dir);
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("cannot create log directory {}", log_dir))?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("dbqueue")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    // Logs go to stderr; stdout carries command output.
    let console_json = config
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let console_text = (!config.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_json)
        .with(console_text)
        .with(file_layer)
        .init();

    Ok(())
}

async fn build_queue(config: &Config) -> anyhow::Result<Queue> {
    let mut events = QueueEvents::new();
    events.on_after_error(|e| {
        if !e.retry {
            warn!(
                "Job {} ({}) failed for good on attempt {}",
                e.id,
                e.kind.unwrap_or("undecodable"),
                e.attempt
            );
        }
    });

    let builder = match config.store.backend {
        StoreBackend::Sqlite => {
            let path = ConfigLoader::expand_path(&config.store.path);
            let store = SqliteMessageStore::open(Path::new(&path))
                .await
                .with_context(|| format!("cannot open queue database {}", path))?;
            let mutex = store.mutex(Duration::from_secs(config.store.mutex_lease_secs));
            info!("Using SQLite store at {}", path);
            Queue::builder(config.queue.clone(), Arc::new(store), Arc::new(mutex))
        }
        StoreBackend::Memory => {
            warn!("Using the memory store; messages do not outlive this process");
            Queue::builder(
                config.queue.clone(),
                Arc::new(MemoryMessageStore::new()),
                Arc::new(MemoryMutex::new()),
            )
        }
    };

    Ok(builder
        .with_registry(jobs::registry())
        .with_events(events)
        .build())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::load_or_default(&cli.config)
        .with_context(|| format!("cannot load {}", cli.config.display()))?;
    if let Some(channel) = cli.channel {
        config.queue.channel = channel;
    }

    init_tracing(&config.logging)?;

    for warning in ConfigValidator::validate(&config).into_result()? {
        warn!("Config {}: {}", warning.path, warning.message);
    }

    let queue = Arc::new(build_queue(&config).await?);

    match cli.command {
        Commands::Run => {
            let token = CancellationToken::new();
            signal::cancel_on_shutdown(token.clone())?;
            let summary = Worker::new(queue, token).run().await?;
            println!(
                "processed: {}, released: {}, retried: {}",
                summary.processed, summary.released, summary.retried
            );
        }
        Commands::Listen { delay } => {
            let delay = Duration::from_secs(delay.unwrap_or(config.worker.listen_delay_secs));
            let token = CancellationToken::new();
            signal::cancel_on_shutdown(token.clone())?;
            Worker::new(queue, token).listen(delay).await?;
        }
        Commands::Push {
            kind,
            data,
            ttr,
            delay,
            priority,
        } => {
            let mut data: serde_json::Value =
                serde_json::from_str(&data).context("job fields must be valid JSON")?;
            let options = PushOptions {
                ttr: jobs::apply_ttr(&kind, &mut data, ttr),
                delay,
                priority,
            };
            match queue.push_json(&kind, data, options).await? {
                Some(id) => println!("{}", id),
                None => println!("push handled by hook"),
            }
        }
        Commands::Status { id } => {
            println!("{}", queue.status(MessageId(id)).await?);
        }
        Commands::Info => {
            let stats = queue.stats().await?;
            println!("channel:  {}", queue.channel());
            println!("waiting:  {}", stats.waiting);
            println!("delayed:  {}", stats.delayed);
            println!("reserved: {}", stats.reserved);
            println!("done:     {}", stats.done);
            println!("kinds:    {}", queue.registry().kinds().join(", "));
        }
        Commands::Remove { id } => {
            if queue.remove(MessageId(id)).await? {
                println!("removed {}", id);
            } else {
                println!("message {} not found", id);
            }
        }
        Commands::Clear => {
            println!("cleared {}", queue.clear().await?);
        }
    }

    Ok(())
}
