//! SIREN: Severe weather alert lifecycle tracking
//!
//! Ingests NWS CAP bulletins, reconstructs the lifecycle of each logical
//! weather event from the stream of independent messages that describe
//! it, and publishes a continuously-maintained geospatial view of the
//! currently active events.
//!
//! ## Architecture
//!
//! - **Lifecycle tracker**: worker pool over the `tracking` queue, one
//!   state document per canonical VTEC event identity, missing history
//!   reconstructed through the reference walker
//! - **Expiry sweeper**: periodic pruning of raw bulletins past expiry
//! - **Geometry engine**: UGC polygon union + simplification per event
//! - **Topology builder**: periodic shared-arc msgpack snapshots with
//!   change-detection caching, served over HTTP

pub mod api;
pub mod cap;
pub mod geo;
pub mod logging;
pub mod metrics;
pub mod nws;
pub mod queue;
pub mod store;
pub mod tracker;
pub mod vtec;

// Re-export the types most callers touch.
pub use cap::Alert;
pub use metrics::Metrics;
pub use store::EventStore;
pub use tracker::{EventState, HistoryEntry, LockRegistry, TrackedEvent, Tracker};
pub use vtec::{Action, ProductClass, Vtec, VtecError, VTEC_PATTERN};
