//! Alert lifecycle tracking
//!
//! The tracker consumes decoded CAP bulletins, groups them by canonical
//! VTEC event identity, reconstructs missing history through the reference
//! walker, and maintains one state document per event. All mutations to a
//! given event happen under its keyed mutex, so a fixed worker pool can
//! ingest concurrently while each event sees a serial update order.

pub mod event;
pub mod locks;
pub mod special;
pub mod sweeper;
pub mod walker;

pub use event::{EventState, HistoryEntry, TrackedEvent};
pub use locks::LockRegistry;
pub use walker::MiniCap;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error};

use crate::cap::Alert;
use crate::metrics::Metrics;
use crate::nws::AlertFetcher;
use crate::store::{EventStore, StoreError};
use crate::vtec::{Action, Vtec};

pub struct Tracker {
    store: EventStore,
    locks: Arc<LockRegistry>,
    fetcher: Arc<dyn AlertFetcher>,
    metrics: Arc<Metrics>,
}

impl Tracker {
    pub fn new(
        store: EventStore,
        locks: Arc<LockRegistry>,
        fetcher: Arc<dyn AlertFetcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { store, locks, fetcher, metrics }
    }

    /// Process one decoded bulletin end to end. Failures are logged, not
    /// returned: there are no application-level retries, and the reference
    /// walker recovers dropped bulletins when a later one cites them.
    pub async fn ingest(&self, alert: Alert) {
        let started = Instant::now();
        let short_id = alert.short_id();
        match self.process(alert).await {
            Ok(event_id) => {
                debug!(alert = %short_id, event = %event_id, "processed bulletin");
            }
            Err(err) => {
                error!(alert = %short_id, %err, "failed to process bulletin");
            }
        }
        self.metrics.processing_time.observe(started.elapsed().as_secs_f64());
        self.metrics.alerts_processed.inc();
    }

    async fn process(&self, alert: Alert) -> Result<String, StoreError> {
        let vtec_str = alert
            .info
            .parameters
            .as_ref()
            .map(|params| params.vtec.clone())
            .unwrap_or_default();
        let vtec = match Vtec::parse(&vtec_str) {
            Ok(vtec) => vtec,
            Err(err) => {
                // Special weather statements and similar products carry no
                // VTEC; they get a synthesized identity instead.
                debug!(alert = %alert.short_id(), %err, "no usable VTEC, tracking as special");
                return special::track(&self.store, &self.locks, &alert).await;
            }
        };

        let event_id = vtec.canonical_event_id();
        let lock = self.locks.get(&event_id);
        let _guard = lock.lock().await;
        let now = Utc::now();

        if vtec.action == Action::New {
            let event = TrackedEvent::from_new_bulletin(&event_id, &alert, vtec.action, now);
            match self.store.insert_event(&event).await {
                Ok(()) => {
                    self.store.insert_alert_if_absent(&alert).await?;
                    return Ok(event_id);
                }
                Err(err) if err.is_duplicate() => {
                    debug!(event = %event_id, "event already tracked, applying NEW as update");
                }
                Err(err) => return Err(err),
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut event = match self.store.get_event(&event_id).await? {
            Some(existing) => existing,
            None => {
                // First sight of a non-NEW bulletin: rebuild the history we
                // missed by walking its reference chain.
                let mut event = TrackedEvent::new(&event_id, now);
                let walked = walker::walk(
                    self.fetcher.as_ref(),
                    &alert.referenced_identifiers(),
                    &event_id,
                    &mut visited,
                )
                .await;
                event.merge_walked(walked);
                event
            }
        };

        visited.extend(event.history_cap_ids());
        visited.insert(alert.identifier.clone());
        let walked = walker::walk(
            self.fetcher.as_ref(),
            &alert.referenced_identifiers(),
            &event_id,
            &mut visited,
        )
        .await;
        event.apply_bulletin(&alert, vtec.action, walked, now);

        self.store.upsert_event(&event).await?;
        self.store.insert_alert_if_absent(&alert).await?;
        Ok(event_id)
    }
}
