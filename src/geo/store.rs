//! Static UGC geometry datastore
//!
//! Two sled databases, one for counties and one for forecast zones, each
//! with a `Data` tree keyed by 6-character UGC code. Values are
//! msgpack-encoded records produced by the offline population tooling.
//! A UGC whose third character is `C` lives in the county store;
//! everything else is a zone.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tree name shared by both databases.
pub const DATA_TREE: &str = "Data";

#[derive(Debug, Error)]
pub enum GeoStoreError {
    #[error("geo datastore error: {0}")]
    Database(#[from] sled::Error),
    #[error("geo datastore decode error for {ugc}: {source}")]
    Decode {
        ugc: String,
        source: rmp_serde::decode::Error,
    },
    #[error("geo datastore encode error for {ugc}: {source}")]
    Encode {
        ugc: String,
        source: rmp_serde::encode::Error,
    },
    #[error("UGC not found: {0}")]
    NotFound(String),
}

/// Stored feature payload. County and zone shapes arrive in either form;
/// the multi-polygon arm is tried first, then the plain polygon. Rings
/// are not guaranteed closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UgcFeature {
    MultiPolygon(Vec<Vec<[f64; 2]>>),
    Polygon(Vec<[f64; 2]>),
}

/// One geographic subdivision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UgcRecord {
    #[serde(rename = "UGC")]
    pub ugc: String,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub state: String,
    pub feature: UgcFeature,
}

pub struct UgcStore {
    _county_db: sled::Db,
    _zone_db: sled::Db,
    county: sled::Tree,
    zone: sled::Tree,
}

impl UgcStore {
    /// Open both databases. Callers treat failure as fatal.
    pub fn open(
        county_path: impl AsRef<Path>,
        zone_path: impl AsRef<Path>,
    ) -> Result<Self, GeoStoreError> {
        let county_db = sled::open(county_path)?;
        let zone_db = sled::open(zone_path)?;
        let county = county_db.open_tree(DATA_TREE)?;
        let zone = zone_db.open_tree(DATA_TREE)?;
        Ok(Self { _county_db: county_db, _zone_db: zone_db, county, zone })
    }

    fn tree_for(&self, ugc: &str) -> &sled::Tree {
        if ugc.as_bytes().get(2) == Some(&b'C') {
            &self.county
        } else {
            &self.zone
        }
    }

    pub fn get(&self, ugc: &str) -> Result<UgcRecord, GeoStoreError> {
        let bytes = self
            .tree_for(ugc)
            .get(ugc)?
            .ok_or_else(|| GeoStoreError::NotFound(ugc.to_string()))?;
        rmp_serde::from_slice(&bytes)
            .map_err(|source| GeoStoreError::Decode { ugc: ugc.to_string(), source })
    }

    /// Write one record into the store matching its UGC type. Used by the
    /// population tooling and tests.
    pub fn insert(&self, record: &UgcRecord) -> Result<(), GeoStoreError> {
        let bytes = rmp_serde::to_vec_named(record).map_err(|source| GeoStoreError::Encode {
            ugc: record.ugc.clone(),
            source,
        })?;
        self.tree_for(&record.ugc).insert(record.ugc.as_bytes(), bytes)?;
        Ok(())
    }
}
