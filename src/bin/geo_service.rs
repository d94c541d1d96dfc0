//! siren-geo: geometry aggregation and topology service
//!
//! Periodically snapshots the active events, derives each one's polygon
//! union from the static UGC datastore, and serves the topology-encoded
//! msgpack payload on :6906.
//!
//! # Environment Variables
//!
//! - `MONGO_URI`: event store endpoint
//! - `ENV`: set to `PROD` to suppress debug logs
//! - `RUST_LOG`: explicit log filter (overrides `ENV`)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use siren::api::{create_app, GeoApiState};
use siren::geo::{builder, TopologyCache, UgcStore};
use siren::{logging, EventStore};

#[derive(Parser, Debug)]
#[command(name = "siren-geo")]
#[command(about = "SIREN geometry and topology service")]
#[command(version)]
struct CliArgs {
    /// Event store endpoint
    #[arg(long, env = "MONGO_URI", default_value = "mongodb://127.0.0.1:27017")]
    mongo_uri: String,

    /// County geometry datastore path
    #[arg(long, default_value = "nws_county.db")]
    county_db: String,

    /// Forecast zone geometry datastore path
    #[arg(long, default_value = "nws_zone.db")]
    zone_db: String,

    /// HTTP listen address
    #[arg(short, long, default_value = "0.0.0.0:6906")]
    addr: String,
}

/// Task identification for supervisor logging
#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    TopologyBuilder,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::TopologyBuilder => write!(f, "TopologyBuilder"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = CliArgs::parse();

    info!("🗺️  SIREN geo service starting");

    let store = EventStore::connect(&args.mongo_uri)
        .await
        .context("Failed to connect to event store")?;
    info!("✓ Event store connected");

    let ugc = Arc::new(
        UgcStore::open(&args.county_db, &args.zone_db)
            .context("Failed to open UGC geometry datastores")?,
    );
    info!("✓ UGC geometry datastores opened");

    let cache = Arc::new(TopologyCache::new());

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: HTTP surface
    {
        let state = GeoApiState {
            store: store.clone(),
            ugc: Arc::clone(&ugc),
            cache: Arc::clone(&cache),
        };
        let app = create_app(state);
        let listener = tokio::net::TcpListener::bind(&args.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", args.addr))?;
        info!("✓ HTTP server listening on {}", args.addr);

        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
                .context("HTTP server error")?;
            Ok(TaskName::HttpServer)
        });
    }

    // Task 2: Periodic topology builder
    {
        let cancel = cancel_token.clone();
        task_set.spawn(async move {
            info!("[TopologyBuilder] Task starting");
            builder::run_builder(store, ugc, cache, cancel).await;
            Ok(TaskName::TopologyBuilder)
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

    info!("✓ SIREN geo service shutdown complete");
    Ok(())
}
