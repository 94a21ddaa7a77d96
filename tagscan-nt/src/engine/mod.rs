//! Nearby-tag reconciliation engine
//!
//! Consumes ranging batches, looks up unknown beacons in the catalog, and keeps
//! a deduplicated, insertion-ordered collection of nearby tags.
//!
//! **Architecture:**
//! - `state`: the collection plus pending-lookup bookkeeping; all reconciliation
//!   rules live here and run under a single write lock
//! - `manager`: the public, thread-safe handle that owns the lock, spawns
//!   lookups, and publishes change events

mod manager;
mod state;

pub use manager::NearbyTagManager;
