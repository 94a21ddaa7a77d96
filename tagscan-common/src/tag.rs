//! Hardware tag model
//!
//! A tag is a catalog content record linked to a physical location. Tags in
//! the nearby collection are either:
//! - **Assigned**: resolved from the catalog; positive id, `identifier` present
//! - **Unassigned**: synthesized locally for a beacon with no catalog match;
//!   negative id, no `identifier`

use serde::{Deserialize, Serialize};

use crate::beacon::{BeaconIdentity, BeaconSighting};

/// Kind of hardware a tag can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagHardwareType {
    #[serde(rename = "qr")]
    Qr,
    #[serde(rename = "nfc")]
    Nfc,
    #[serde(rename = "ble-beacon")]
    BleBeacon,
}

impl TagHardwareType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagHardwareType::Qr => "qr",
            TagHardwareType::Nfc => "nfc",
            TagHardwareType::BleBeacon => "ble-beacon",
        }
    }
}

/// Parent tag linkage
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParentTag {
    pub id: i64,
    pub name: Option<String>,
    pub identifier: Option<String>,
}

/// Reference to a related tag
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkedTag {
    pub id: i64,
    pub name: Option<String>,
    pub identifier: Option<String>,
}

/// Descriptive content of a tag
///
/// Opaque to reconciliation: the engine copies it around but never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    /// Translated body text in the requested language
    pub translation: Option<String>,
    pub button_text: Option<String>,
    pub gender: Option<String>,
    pub image_url: Option<String>,
    pub text_url: Option<String>,
    pub parent: Option<ParentTag>,
    #[serde(default)]
    pub linked_tags: Vec<LinkedTag>,
}

/// A resolved tag or a local placeholder bound to a beacon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareTag {
    /// Catalog id (> 0) or placeholder id (< 0)
    pub id: i64,

    /// Catalog identifier; `None` marks an unassigned placeholder
    pub identifier: Option<String>,

    /// Beacon currently backing this tag, refreshed on every sighting
    pub beacon: Option<BeaconSighting>,

    #[serde(default)]
    pub payload: TagPayload,
}

impl HardwareTag {
    /// Catalog tag with the given id and identifier, not yet bound to a beacon
    pub fn assigned(id: i64, identifier: impl Into<String>) -> Self {
        Self {
            id,
            identifier: Some(identifier.into()),
            beacon: None,
            payload: TagPayload::default(),
        }
    }

    /// Placeholder for a beacon the catalog does not know
    pub fn unassigned(id: i64, sighting: BeaconSighting) -> Self {
        let name = format!(
            "Unassigned Tag: {} - {}",
            sighting.identity.major, sighting.identity.minor
        );
        Self {
            id,
            identifier: None,
            beacon: Some(sighting),
            payload: TagPayload {
                name: Some(name),
                ..TagPayload::default()
            },
        }
    }

    pub fn with_payload(mut self, payload: TagPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_beacon(mut self, sighting: BeaconSighting) -> Self {
        self.beacon = Some(sighting);
        self
    }

    pub fn is_assigned(&self) -> bool {
        self.identifier.is_some()
    }

    /// Identity of the backing beacon, if bound
    pub fn beacon_identity(&self) -> Option<BeaconIdentity> {
        self.beacon.as_ref().map(|b| b.identity)
    }

    pub fn name(&self) -> Option<&str> {
        self.payload.name.as_deref()
    }
}

/// Split an ancestry path like `123/118/20` into its segments
///
/// Empty input yields no segments.
pub fn parse_ancestry(ancestry: Option<&str>) -> Vec<String> {
    match ancestry {
        Some(path) if !path.is_empty() => path.split('/').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
