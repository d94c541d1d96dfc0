//! Geometry aggregation and topology pipeline
//!
//! - `store`: sled-backed static UGC geometry lookups
//! - `engine`: polygon union + simplification per event
//! - `colors`: the phenomena/significance display color contract
//! - `topology`: shared-arc msgpack encoding of a feature collection
//! - `builder`: the periodic snapshot pipeline and its byte cache

pub mod builder;
pub mod colors;
pub mod engine;
pub mod store;
pub mod topology;

pub use builder::{BuildOutcome, TopologyCache};
pub use engine::{EventGeometry, GeometryError};
pub use store::{UgcFeature, UgcRecord, UgcStore};
