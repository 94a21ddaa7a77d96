//! Nearby-tag change type definitions
//!
//! Supporting types for nearby collection change events.

use serde::{Deserialize, Serialize};

/// Why the nearby collection changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NearbyChangeTrigger {
    /// Tags evicted while applying a sighting batch
    SightingBatch,
    /// A catalog lookup completed and inserted a tag
    LookupCompleted,
    /// The collection was cleared (reset, display mode flip, shutdown)
    Reset,
    /// A tag was injected by hardware id outside the ranging path
    ManualInsert,
}

impl std::fmt::Display for NearbyChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NearbyChangeTrigger::SightingBatch => write!(f, "SightingBatch"),
            NearbyChangeTrigger::LookupCompleted => write!(f, "LookupCompleted"),
            NearbyChangeTrigger::Reset => write!(f, "Reset"),
            NearbyChangeTrigger::ManualInsert => write!(f, "ManualInsert"),
        }
    }
}
