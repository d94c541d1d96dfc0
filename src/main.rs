//! siren-tracker: alert lifecycle tracking service
//!
//! Consumes decoded CAP bulletins from the durable `tracking` queue with a
//! fixed worker pool, maintains one lifecycle document per canonical VTEC
//! event, prunes expired events on a timer, and exposes Prometheus
//! metrics.
//!
//! # Environment Variables
//!
//! - `RABBITMQ_URL`: AMQP endpoint for the tracking/push queues
//! - `MONGO_URI`: event store endpoint
//! - `METRICS_PORT`: metrics listener port (default: 6901)
//! - `ENV`: set to `PROD` to suppress debug logs
//! - `RUST_LOG`: explicit log filter (overrides `ENV`)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use siren::nws::NwsClient;
use siren::tracker::{locks, sweeper, LockRegistry, Tracker};
use siren::{logging, metrics, queue, EventStore, Metrics};

#[derive(Parser, Debug)]
#[command(name = "siren-tracker")]
#[command(about = "SIREN alert lifecycle tracking service")]
#[command(version)]
struct CliArgs {
    /// AMQP endpoint for the inbound tracking queue
    #[arg(long, env = "RABBITMQ_URL", default_value = "amqp://127.0.0.1:5672")]
    rabbitmq_url: String,

    /// Event store endpoint
    #[arg(long, env = "MONGO_URI", default_value = "mongodb://127.0.0.1:27017")]
    mongo_uri: String,

    /// Metrics listener port
    #[arg(long, env = "METRICS_PORT", default_value_t = metrics::DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// Queue consumer pool size
    #[arg(long, default_value_t = queue::DEFAULT_WORKERS)]
    workers: usize,
}

/// Task identification for supervisor logging
#[derive(Debug, Clone, Copy)]
enum TaskName {
    MetricsServer,
    QueueWorkers,
    ExpirySweeper,
    LockJanitor,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::MetricsServer => write!(f, "MetricsServer"),
            TaskName::QueueWorkers => write!(f, "QueueWorkers"),
            TaskName::ExpirySweeper => write!(f, "ExpirySweeper"),
            TaskName::LockJanitor => write!(f, "LockJanitor"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = CliArgs::parse();

    info!("🚨 SIREN tracking service starting");

    // Fatal on any initial connection failure: there is nothing useful to
    // do without the store and the queue.
    let store = EventStore::connect(&args.mongo_uri)
        .await
        .context("Failed to connect to event store")?;
    info!("✓ Event store connected");

    let (_connection, channel) = queue::connect(&args.rabbitmq_url)
        .await
        .context("Failed to connect to message queue")?;
    info!("✓ Message queue connected, queues declared");

    let metrics = Arc::new(Metrics::new().context("Failed to build metrics registry")?);
    let registry = Arc::new(LockRegistry::new());
    let fetcher = Arc::new(NwsClient::new().context("Failed to build upstream HTTP client")?);
    let tracker = Arc::new(Tracker::new(
        store.clone(),
        Arc::clone(&registry),
        fetcher,
        Arc::clone(&metrics),
    ));

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: Metrics server
    {
        let metrics = Arc::clone(&metrics);
        let cancel = cancel_token.clone();
        let port = args.metrics_port;
        task_set.spawn(async move {
            metrics::serve(metrics, port, cancel).await?;
            Ok(TaskName::MetricsServer)
        });
    }

    // Task 2: Queue worker pool
    {
        let tracker = Arc::clone(&tracker);
        let metrics = Arc::clone(&metrics);
        let cancel = cancel_token.clone();
        let workers = args.workers;
        task_set.spawn(async move {
            info!(workers, "[QueueWorkers] Task starting");
            queue::run_workers(channel, tracker, metrics, workers, cancel).await?;
            Ok(TaskName::QueueWorkers)
        });
    }

    // Task 3: Expiry sweeper
    {
        let store = store.clone();
        let registry = Arc::clone(&registry);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            info!("[ExpirySweeper] Task starting");
            sweeper::run_sweeper(store, registry, cancel).await;
            Ok(TaskName::ExpirySweeper)
        });
    }

    // Task 4: Lock janitor
    {
        let registry = Arc::clone(&registry);
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            info!("[LockJanitor] Task starting");
            locks::run_janitor(registry, cancel).await;
            Ok(TaskName::LockJanitor)
        });
    }

    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    info!("✓ SIREN tracking service shutdown complete");
    Ok(())
}
