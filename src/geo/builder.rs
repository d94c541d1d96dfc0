//! Topology builder
//!
//! The periodic path snapshots every active event that lacks an embedded
//! polygon, derives geometry for each from its UGC areas, and caches the
//! msgpack topology payload. A SHA-256 over the sorted active identifiers
//! short-circuits the rebuild when the active set has not changed. The
//! on-demand path computes a payload for an explicit identifier list and
//! never touches the cache.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::geo::engine::{compute_geometry, feature_collection, EventGeometry};
use crate::geo::store::UgcStore;
use crate::geo::topology::{Topology, TopologyError};
use crate::store::{EventStore, StoreError};

/// Rebuild period.
pub const BUILD_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("no valid geometries for requested events")]
    NoGeometries,
}

/// Outcome of one periodic build pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The active set changed; `events` geometries were rebuilt.
    Rebuilt { events: usize },
    /// The active set hash matched the previous snapshot.
    Unchanged,
}

/// The served payload plus the active-set hash it was built from.
/// Readers see either the previous buffer or the new one, never a tear.
pub struct TopologyCache {
    snapshot: RwLock<CacheState>,
}

#[derive(Default)]
struct CacheState {
    bytes: Arc<Vec<u8>>,
    active_hash: [u8; 32],
}

impl TopologyCache {
    pub fn new() -> Self {
        Self { snapshot: RwLock::new(CacheState::default()) }
    }

    /// Current payload under the shared lock.
    pub async fn bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.snapshot.read().await.bytes)
    }

    async fn is_current(&self, active_hash: [u8; 32]) -> bool {
        self.snapshot.read().await.active_hash == active_hash
    }

    async fn replace(&self, bytes: Vec<u8>, active_hash: [u8; 32]) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.bytes = Arc::new(bytes);
        snapshot.active_hash = active_hash;
    }
}

impl Default for TopologyCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the periodic builder until cancelled. One build fires immediately
/// so the cache is warm before the first tick.
pub async fn run_builder(
    store: EventStore,
    ugc: Arc<UgcStore>,
    cache: Arc<TopologyCache>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(BUILD_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match build_active_snapshot(&store, &ugc, &cache).await {
                    Ok(BuildOutcome::Rebuilt { events }) => {
                        info!(events, "rebuilt topology snapshot");
                    }
                    Ok(BuildOutcome::Unchanged) => {
                        debug!("active set unchanged, keeping cached topology");
                    }
                    Err(err) => error!(%err, "topology build failed"),
                }
            }
        }
    }
}

/// One periodic build pass.
pub async fn build_active_snapshot(
    store: &EventStore,
    ugc: &UgcStore,
    cache: &TopologyCache,
) -> Result<BuildOutcome, SnapshotError> {
    let active = store.active_events().await?;

    // Events carrying their own polygon are rendered from it downstream;
    // only the rest get geometry derived from UGC areas.
    let selected: Vec<_> = active
        .into_iter()
        .filter(|event| event.cap_info.info.area.polygon.is_none())
        .collect();

    let mut identifiers: Vec<&str> = selected.iter().map(|e| e.identifier.as_str()).collect();
    identifiers.sort_unstable();
    let active_hash: [u8; 32] = Sha256::digest(identifiers.join(",").as_bytes()).into();
    if cache.is_current(active_hash).await {
        return Ok(BuildOutcome::Unchanged);
    }

    let mut geometries: Vec<EventGeometry> = Vec::with_capacity(selected.len());
    for event in &selected {
        match compute_geometry(ugc, &event.areas, &event.identifier) {
            Ok(geometry) => geometries.push(geometry),
            Err(err) => {
                // Skipped this snapshot; retried on the next tick.
                warn!(event = %event.identifier, %err, "skipping event geometry");
            }
        }
    }

    let collection = feature_collection(&geometries);
    let bytes = Topology::from_features(&collection).to_msgpack()?;
    let events = geometries.len();
    cache.replace(bytes, active_hash).await;
    Ok(BuildOutcome::Rebuilt { events })
}

/// On-demand payload for an explicit identifier list. Geometry is
/// computed unconditionally and the shared cache is left untouched.
pub async fn build_on_demand(
    store: &EventStore,
    ugc: &UgcStore,
    identifiers: &[String],
) -> Result<Vec<u8>, SnapshotError> {
    let events = store.events_by_ids(identifiers).await?;
    let mut geometries = Vec::with_capacity(events.len());
    for event in &events {
        match compute_geometry(ugc, &event.areas, &event.identifier) {
            Ok(geometry) => geometries.push(geometry),
            Err(err) => {
                warn!(event = %event.identifier, %err, "skipping requested geometry");
            }
        }
    }
    if geometries.is_empty() {
        return Err(SnapshotError::NoGeometries);
    }
    let collection = feature_collection(&geometries);
    Ok(Topology::from_features(&collection).to_msgpack()?)
}
