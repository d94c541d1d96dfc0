//! Event store
//!
//! Two collections in the `siren` database: `alerts` holds raw CAP
//! bulletins keyed by CAP identifier, `state` holds one lifecycle document
//! per canonical event identifier. Writes are upserts by identifier;
//! unique indexes make duplicate inserts observable as distinct errors so
//! the NEW path can fall through to the update path.
//!
//! "Not found" is control flow (`Option`), never an error.

use futures::TryStreamExt;
use mongodb::bson::{self, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, IndexOptions, ReplaceOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::Deserialize;
use thiserror::Error;

use chrono::{DateTime, Utc};

use crate::cap::Alert;
use crate::tracker::TrackedEvent;

pub const DATABASE: &str = "siren";
pub const ALERTS_COLLECTION: &str = "alerts";
pub const STATE_COLLECTION: &str = "state";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("event store decode error: {0}")]
    Decode(#[from] bson::de::Error),
    #[error("event already exists: {0}")]
    DuplicateEvent(String),
}

impl StoreError {
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateEvent(_))
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

/// Identifier + expiry, the sweeper's working set.
#[derive(Debug, Clone, Deserialize)]
pub struct EventKey {
    pub identifier: String,
    pub expires: DateTime<Utc>,
}

/// An active event joined to its most recent raw CAP.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEvent {
    pub identifier: String,
    #[serde(default)]
    pub areas: Vec<String>,
    pub cap_info: Alert,
}

#[derive(Clone)]
pub struct EventStore {
    alerts: Collection<Alert>,
    state: Collection<TrackedEvent>,
}

impl EventStore {
    /// Connect, verify the server responds, and ensure indexes. Callers
    /// treat failure here as fatal.
    pub async fn connect(uri: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        client.database(DATABASE).run_command(doc! { "ping": 1 }, None).await?;

        let store = Self::new(&client);
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Collection handles over an existing client. The mongodb client is
    /// lazy, so this performs no I/O.
    pub fn new(client: &Client) -> Self {
        let db = client.database(DATABASE);
        Self {
            alerts: db.collection(ALERTS_COLLECTION),
            state: db.collection(STATE_COLLECTION),
        }
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique_identifier = IndexModel::builder()
            .keys(doc! { "identifier": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.alerts.create_index(unique_identifier.clone(), None).await?;
        self.state.create_index(unique_identifier, None).await?;
        Ok(())
    }

    /// Insert a brand-new event document. A concurrent or earlier insert
    /// for the same identifier surfaces as `DuplicateEvent`.
    pub async fn insert_event(&self, event: &TrackedEvent) -> Result<(), StoreError> {
        match self.state.insert_one(event, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => {
                Err(StoreError::DuplicateEvent(event.identifier.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_event(&self, identifier: &str) -> Result<Option<TrackedEvent>, StoreError> {
        Ok(self.state.find_one(doc! { "identifier": identifier }, None).await?)
    }

    pub async fn upsert_event(&self, event: &TrackedEvent) -> Result<(), StoreError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.state
            .replace_one(doc! { "identifier": &event.identifier }, event, options)
            .await?;
        Ok(())
    }

    /// Store a raw bulletin unless one with the same identifier already
    /// exists. Returns whether a write happened.
    pub async fn insert_alert_if_absent(&self, alert: &Alert) -> Result<bool, StoreError> {
        let existing = self
            .alerts
            .find_one(doc! { "identifier": &alert.identifier }, None)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }
        match self.alerts.insert_one(alert, None).await {
            Ok(_) => Ok(true),
            // Lost a race with a concurrent insert; that copy is as good.
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_alert(&self, identifier: &str) -> Result<Option<Alert>, StoreError> {
        Ok(self.alerts.find_one(doc! { "identifier": identifier }, None).await?)
    }

    /// Delete raw bulletins by identifier; returns the deleted count.
    pub async fn delete_alerts(&self, identifiers: &[String]) -> Result<u64, StoreError> {
        if identifiers.is_empty() {
            return Ok(0);
        }
        let result = self
            .alerts
            .delete_many(doc! { "identifier": { "$in": identifiers.to_vec() } }, None)
            .await?;
        Ok(result.deleted_count)
    }

    /// Identifier and expiry of every event document.
    pub async fn event_expiry_keys(&self) -> Result<Vec<EventKey>, StoreError> {
        let options = FindOptions::builder()
            .projection(doc! { "identifier": 1, "expires": 1, "_id": 0 })
            .build();
        let mut cursor = self.state.clone_with_type::<EventKey>().find(None, options).await?;
        let mut keys = Vec::new();
        while let Some(key) = cursor.try_next().await? {
            keys.push(key);
        }
        Ok(keys)
    }

    /// All `Active` events joined to their most recent raw CAP.
    pub async fn active_events(&self) -> Result<Vec<ActiveEvent>, StoreError> {
        let pipeline = vec![
            doc! { "$match": { "state": "Active" } },
            doc! { "$lookup": {
                "from": ALERTS_COLLECTION,
                "localField": "mostRecentCAP",
                "foreignField": "identifier",
                "as": "capInfo",
            } },
            doc! { "$unwind": "$capInfo" },
        ];
        let mut cursor = self.state.aggregate(pipeline, None).await?;
        let mut events = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            events.push(bson::from_document(document)?);
        }
        Ok(events)
    }

    pub async fn events_by_ids(&self, identifiers: &[String]) -> Result<Vec<TrackedEvent>, StoreError> {
        let mut cursor = self
            .state
            .find(doc! { "identifier": { "$in": identifiers.to_vec() } }, None)
            .await?;
        let mut events = Vec::new();
        while let Some(event) = cursor.try_next().await? {
            events.push(event);
        }
        Ok(events)
    }
}
