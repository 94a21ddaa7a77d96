//! Nearby Tags (tagscan-nt) - Library interface
//!
//! Turns a stream of beacon ranging reports into a stable, deduplicated list
//! of nearby tags that UI code can read from any thread.
//!
//! - [`engine::NearbyTagManager`]: the reconciliation engine
//! - [`resolver`]: the catalog lookup seam and an in-memory catalog
//! - [`ranging`]: monitored regions and per-region report aggregation
//! - [`scenario`]: TOML scenario files driving the simulator binary

pub mod engine;
pub mod error;
pub mod ranging;
pub mod resolver;
pub mod scenario;

pub use engine::NearbyTagManager;
pub use error::{Error, Result};
pub use resolver::{ResolveError, TagResolver};
