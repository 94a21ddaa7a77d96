//! Scenario files for the simulator
//!
//! A scenario describes a catalog and a timed sequence of sighting batches:
//!
//! ```toml
//! interval_ms = 500
//! resolver_latency_ms = 150
//!
//! [[catalog]]
//! beacon = "CEFCC021-E45F-4520-A3AB-9D1EA22873AD:1:7"
//! id = 42
//! identifier = "abc"
//! name = "Front desk"
//!
//! [[batch]]
//! beacons = ["CEFCC021-E45F-4520-A3AB-9D1EA22873AD:1:7"]
//!
//! [[batch]]
//! beacons = []
//! show_unassigned = true
//! ```
//!
//! `regions` is optional; when omitted, every proximity UUID that appears in a
//! batch is monitored.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tagscan_common::tag::{parse_ancestry, ParentTag, TagHardwareType, TagPayload};
use tagscan_common::{BeaconIdentity, BeaconSighting, HardwareTag};
use tracing::debug;

use crate::resolver::StaticCatalogResolver;
use crate::{Error, Result};

/// Parsed scenario file
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Delay between batches
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Artificial latency of every catalog lookup
    #[serde(default)]
    pub resolver_latency_ms: u64,

    /// Proximity UUIDs to monitor (hardware id form)
    #[serde(default)]
    pub regions: Vec<String>,

    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,

    #[serde(default, rename = "batch")]
    pub batches: Vec<BatchEntry>,
}

/// One catalog tag bound to a beacon
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Beacon in `UUID:major:minor` form
    pub beacon: String,
    pub id: i64,
    pub identifier: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub image_url: Option<String>,

    /// Only beacon tags can show up in a sighting batch
    #[serde(default = "default_hardware_type")]
    pub hardware_type: TagHardwareType,

    /// Parent ids from the root down, e.g. `123/118/20`
    pub ancestry: Option<String>,
}

/// One ranging report
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntry {
    #[serde(default)]
    pub beacons: Vec<String>,

    /// Switch display mode before this batch is applied
    pub show_unassigned: Option<bool>,
}

/// A batch ready to feed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioStep {
    pub show_unassigned: Option<bool>,
    pub sightings: Vec<BeaconSighting>,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_hardware_type() -> TagHardwareType {
    TagHardwareType::BleBeacon
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(content)?;
        if scenario.batches.is_empty() {
            return Err(Error::Scenario("scenario has no [[batch]] entries".to_string()));
        }
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let scenario = Self::from_toml_str(&content)?;
        debug!(
            "Loaded scenario {} ({} catalog entries, {} batches)",
            path.display(),
            scenario.catalog.len(),
            scenario.batches.len()
        );
        Ok(scenario)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// In-memory catalog built from the `[[catalog]]` entries
    pub fn build_resolver(&self) -> Result<StaticCatalogResolver> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.catalog.len());

        for entry in &self.catalog {
            let identity: BeaconIdentity = entry.beacon.parse()?;
            if entry.id <= 0 {
                return Err(Error::Scenario(format!(
                    "catalog id for {} must be positive, got {}",
                    entry.beacon, entry.id
                )));
            }
            if entry.identifier.is_empty() {
                return Err(Error::Scenario(format!(
                    "catalog entry for {} has an empty identifier",
                    entry.beacon
                )));
            }
            if entry.hardware_type != TagHardwareType::BleBeacon {
                return Err(Error::Scenario(format!(
                    "catalog entry for {} is a {} tag; only ble-beacon tags can be sighted",
                    entry.beacon,
                    entry.hardware_type.as_str()
                )));
            }
            if !seen.insert(identity) {
                return Err(Error::Scenario(format!(
                    "beacon {} appears twice in the catalog",
                    identity
                )));
            }

            let parent = parse_ancestry(entry.ancestry.as_deref())
                .last()
                .and_then(|id| id.parse::<i64>().ok())
                .map(|id| ParentTag {
                    id,
                    ..ParentTag::default()
                });
            let payload = TagPayload {
                name: entry.name.clone(),
                description: entry.description.clone(),
                category_id: entry.category_id,
                image_url: entry.image_url.clone(),
                parent,
                ..TagPayload::default()
            };
            let tag = HardwareTag::assigned(entry.id, entry.identifier.clone()).with_payload(payload);
            entries.push((identity, tag));
        }

        let resolver: StaticCatalogResolver = entries.into_iter().collect();
        Ok(if self.resolver_latency_ms > 0 {
            resolver.with_latency(Duration::from_millis(self.resolver_latency_ms))
        } else {
            resolver
        })
    }

    /// Batches with beacon strings parsed into sightings
    pub fn steps(&self) -> Result<Vec<ScenarioStep>> {
        self.batches
            .iter()
            .enumerate()
            .map(|(index, batch)| -> Result<ScenarioStep> {
                let sightings = batch
                    .beacons
                    .iter()
                    .map(|raw| {
                        raw.parse::<BeaconIdentity>()
                            .map(BeaconSighting::new)
                            .map_err(|e| Error::Scenario(format!("batch {}: {}", index + 1, e)))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ScenarioStep {
                    show_unassigned: batch.show_unassigned,
                    sightings,
                })
            })
            .collect()
    }

    /// Regions to monitor: the listed ones, or every UUID seen in a batch
    pub fn region_ids(&self) -> Result<Vec<String>> {
        if !self.regions.is_empty() {
            return Ok(self.regions.clone());
        }

        let mut seen = HashSet::new();
        let mut regions = Vec::new();
        for step in self.steps()? {
            for sighting in step.sightings {
                if seen.insert(sighting.identity.uuid) {
                    regions.push(sighting.identity.hardware_id());
                }
            }
        }
        Ok(regions)
    }
}
