//! Keyed mutex registry
//!
//! All mutations to one event document happen under that event's mutex, so
//! concurrent bulletins for the same event serialize while distinct events
//! proceed in parallel. The registry is a concurrent map from canonical
//! event identifier to a reference-counted lock plus a last-used stamp; a
//! janitor evicts entries idle past the threshold. Eviction is safe: a
//! re-fetched key simply yields a fresh, functionally equivalent lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often the janitor scans for stale locks.
pub const JANITOR_INTERVAL: Duration = Duration::from_secs(300);

/// Idle age past which a lock entry is evicted.
pub const MAX_IDLE: Duration = Duration::from_secs(300);

struct LockEntry {
    lock: Arc<Mutex<()>>,
    last_used: Instant,
}

/// Concurrent map of per-event mutexes.
#[derive(Default)]
pub struct LockRegistry {
    locks: DashMap<String, LockEntry>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    /// Fetch (installing if absent) the lock for an event identifier and
    /// refresh its last-used stamp.
    pub fn get(&self, event_id: &str) -> Arc<Mutex<()>> {
        let mut entry = self
            .locks
            .entry(event_id.to_string())
            .or_insert_with(|| LockEntry { lock: Arc::new(Mutex::new(())), last_used: Instant::now() });
        entry.last_used = Instant::now();
        Arc::clone(&entry.lock)
    }

    /// Drop every entry idle longer than `max_idle`; returns the count.
    pub fn evict_stale(&self, max_idle: Duration) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, entry| entry.last_used.elapsed() <= max_idle);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Periodic eviction of idle per-event locks.
pub async fn run_janitor(registry: Arc<LockRegistry>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a fresh start is silent.
    ticker.tick().await;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = registry.evict_stale(MAX_IDLE);
                if evicted > 0 {
                    debug!(evicted, remaining = registry.len(), "evicted stale event locks");
                }
            }
        }
    }
}
