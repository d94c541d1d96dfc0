//! Expiry sweeper
//!
//! Every five minutes, events whose `expires` has passed get their raw CAP
//! bulletins pruned from the `alerts` collection and their state flipped
//! to `Inactive`. The event document itself is retained. The per-event
//! mutex is held only while one event is swept, never across the whole
//! pass, so a slow store cannot starve the ingest workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::store::{EventStore, StoreError};
use crate::tracker::event::EventState;
use crate::tracker::locks::LockRegistry;

/// Sweep period.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Run the sweeper until cancelled.
pub async fn run_sweeper(store: EventStore, locks: Arc<LockRegistry>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match sweep_once(&store, &locks).await {
                    Ok(0) => debug!("sweep pass found no expired events"),
                    Ok(swept) => info!(swept, "pruned expired events"),
                    Err(err) => error!(%err, "sweep pass failed"),
                }
            }
        }
    }
}

/// One pass over every event document. Per-event failures are logged and
/// skipped; the next pass retries them.
pub async fn sweep_once(store: &EventStore, locks: &LockRegistry) -> Result<usize, StoreError> {
    let now = Utc::now();
    let keys = store.event_expiry_keys().await?;
    let mut swept = 0;
    for key in keys {
        if key.expires >= now {
            continue;
        }
        match sweep_event(store, locks, &key.identifier, now).await {
            Ok(true) => swept += 1,
            Ok(false) => {}
            Err(err) => error!(event = %key.identifier, %err, "failed to sweep event"),
        }
    }
    Ok(swept)
}

async fn sweep_event(
    store: &EventStore,
    locks: &LockRegistry,
    identifier: &str,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let lock = locks.get(identifier);
    let _guard = lock.lock().await;

    let Some(mut event) = store.get_event(identifier).await? else {
        return Ok(false);
    };
    let cap_ids: Vec<String> = event.history_cap_ids().into_iter().collect();
    let deleted = store.delete_alerts(&cap_ids).await?;
    if deleted > 0 {
        debug!(event = %identifier, deleted, "pruned raw bulletins");
    }
    let mut changed = deleted > 0;
    if event.state != EventState::Inactive {
        event.state = EventState::Inactive;
        event.last_updated_time = now;
        store.upsert_event(&event).await?;
        changed = true;
    }
    Ok(changed)
}
