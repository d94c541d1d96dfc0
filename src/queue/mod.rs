//! Message queue plumbing
//!
//! Bulletins arrive msgpack-encoded on the durable `tracking` queue and,
//! once processed, are republished verbatim to the durable `push` queue
//! for downstream subscribers. Consumption is auto-acked: a bulletin lost
//! mid-flight is recovered later through the reference walker, not by
//! redelivery.

use std::sync::Arc;

use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cap::Alert;
use crate::metrics::Metrics;
use crate::tracker::Tracker;

/// Inbound queue of decoded CAP bulletins.
pub const TRACKING_QUEUE: &str = "tracking";

/// Outbound queue for downstream subscribers.
pub const PUSH_QUEUE: &str = "push";

/// Fixed consumer pool size.
pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("message queue error: {0}")]
    Amqp(#[from] lapin::Error),
}

/// Connect and declare both durable queues. Callers treat failure as
/// fatal.
pub async fn connect(url: &str) -> Result<(Connection, Channel), QueueError> {
    let connection = Connection::connect(url, ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;
    for queue in [TRACKING_QUEUE, PUSH_QUEUE] {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions { durable: true, ..QueueDeclareOptions::default() },
                FieldTable::default(),
            )
            .await?;
    }
    Ok((connection, channel))
}

/// Run `workers` concurrent consumers on the tracking queue until the
/// queue closes or the token cancels. Each consumer is independent at the
/// AMQP level, so the broker round-robins deliveries across the pool.
pub async fn run_workers(
    channel: Channel,
    tracker: Arc<Tracker>,
    metrics: Arc<Metrics>,
    workers: usize,
    cancel: CancellationToken,
) -> Result<(), QueueError> {
    let mut pool = JoinSet::new();
    for worker in 0..workers {
        let consumer = channel
            .basic_consume(
                TRACKING_QUEUE,
                &format!("siren-tracker-{worker}"),
                BasicConsumeOptions { no_ack: true, ..BasicConsumeOptions::default() },
                FieldTable::default(),
            )
            .await?;
        let channel = channel.clone();
        let tracker = Arc::clone(&tracker);
        let metrics = Arc::clone(&metrics);
        let cancel = cancel.clone();
        pool.spawn(consume_loop(worker, consumer, channel, tracker, metrics, cancel));
    }

    while let Some(result) = pool.join_next().await {
        if let Err(err) = result {
            error!(%err, "queue worker panicked");
        }
    }
    Ok(())
}

async fn consume_loop(
    worker: usize,
    mut consumer: lapin::Consumer,
    channel: Channel,
    tracker: Arc<Tracker>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) {
    info!(worker, "queue worker started");
    loop {
        let delivery = tokio::select! {
            () = cancel.cancelled() => break,
            delivery = consumer.next() => delivery,
        };
        let delivery = match delivery {
            Some(Ok(delivery)) => delivery,
            Some(Err(err)) => {
                error!(worker, %err, "queue delivery failed");
                continue;
            }
            None => {
                warn!(worker, "queue consumer closed");
                break;
            }
        };

        metrics.alerts_received.inc();
        let alert: Alert = match rmp_serde::from_slice(&delivery.data) {
            Ok(alert) => alert,
            Err(err) => {
                warn!(worker, %err, "undecodable bulletin dropped");
                continue;
            }
        };

        tracker.ingest(alert).await;

        if let Err(err) = publish_push(&channel, &delivery.data).await {
            error!(worker, %err, "failed to republish bulletin to push queue");
        }
    }
    info!(worker, "queue worker stopped");
}

async fn publish_push(channel: &Channel, body: &[u8]) -> Result<(), QueueError> {
    channel
        .basic_publish(
            "",
            PUSH_QUEUE,
            BasicPublishOptions::default(),
            body,
            BasicProperties::default(),
        )
        .await?
        .await?;
    Ok(())
}
