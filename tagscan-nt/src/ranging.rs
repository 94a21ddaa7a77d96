//! Monitored regions and ranging aggregation
//!
//! The platform ranges each monitored proximity UUID (a "region") on its own
//! and reports per region. The engine wants one batch describing everything in
//! range, so [`RangingAggregator`] keeps the latest report per region and
//! forwards the union on every report.

use std::collections::BTreeMap;
use std::sync::Arc;

use tagscan_common::beacon::parse_hardware_id;
use tagscan_common::config::DEFAULT_MAX_MONITORED_REGIONS;
use tagscan_common::events::{ChangeNotifier, NearbyEvent};
use tagscan_common::BeaconSighting;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result};

/// Receives complete sighting batches
pub trait SightingSink: Send + Sync {
    fn on_sightings(&self, batch: Vec<BeaconSighting>);
}

/// Produces sighting batches for a registered sink
///
/// No ordering or deduplication guarantee is assumed of implementations.
pub trait SightingSource {
    fn attach(&mut self, sink: Arc<dyn SightingSink>);
}

/// Set of monitored proximity UUIDs, capped at the platform limit
pub struct RegionRegistry {
    uuids: Vec<Uuid>,
    max_regions: usize,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MONITORED_REGIONS)
    }
}

impl RegionRegistry {
    pub fn new(max_regions: usize) -> Self {
        Self {
            uuids: Vec::new(),
            max_regions,
            notifier: None,
        }
    }

    /// Publish `RegionsAdded` events through `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Add one UUID given as a hardware id string
    ///
    /// Returns `Ok(false)` when the UUID is already monitored.
    pub fn add_custom_uuid(&mut self, hardware_id: &str) -> Result<bool> {
        let uuid = parse_hardware_id(hardware_id)?;
        if self.contains(&uuid) {
            return Ok(false);
        }
        if self.uuids.len() >= self.max_regions {
            return Err(Error::RegionLimit(format!(
                "cannot monitor {}: already at {} regions",
                uuid, self.max_regions
            )));
        }

        self.uuids.push(uuid);
        self.announce(vec![uuid]);
        Ok(true)
    }

    /// Add UUIDs advertised by the catalog
    ///
    /// Invalid ids are skipped; ids beyond the limit are dropped. Returns the
    /// UUIDs that were newly added.
    pub fn add_server_uuids<S: AsRef<str>>(&mut self, hardware_ids: &[S]) -> Vec<Uuid> {
        let mut added = Vec::new();
        for raw in hardware_ids {
            let raw = raw.as_ref();
            let uuid = match parse_hardware_id(raw) {
                Ok(uuid) => uuid,
                Err(e) => {
                    warn!("Skipping catalog region '{}': {}", raw, e);
                    continue;
                }
            };
            if self.contains(&uuid) {
                continue;
            }
            if self.uuids.len() >= self.max_regions {
                warn!(
                    "Region limit {} reached, dropping remaining catalog regions",
                    self.max_regions
                );
                break;
            }
            self.uuids.push(uuid);
            added.push(uuid);
        }

        if !added.is_empty() {
            self.announce(added.clone());
        }
        added
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.uuids.contains(uuid)
    }

    /// Monitored UUIDs in registration order
    pub fn uuids(&self) -> &[Uuid] {
        &self.uuids
    }

    pub fn len(&self) -> usize {
        self.uuids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uuids.is_empty()
    }

    fn announce(&self, uuids: Vec<Uuid>) {
        debug!("Now monitoring {} regions (+{})", self.uuids.len(), uuids.len());
        if let Some(notifier) = &self.notifier {
            notifier.publish(NearbyEvent::RegionsAdded {
                uuids,
                timestamp: chrono::Utc::now(),
            });
        }
    }
}

/// Merges per-region ranging reports into full sighting batches
pub struct RangingAggregator {
    registry: RegionRegistry,
    latest: BTreeMap<Uuid, Vec<BeaconSighting>>,
    sink: Option<Arc<dyn SightingSink>>,
}

impl RangingAggregator {
    pub fn new(registry: RegionRegistry) -> Self {
        Self {
            registry,
            latest: BTreeMap::new(),
            sink: None,
        }
    }

    pub fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RegionRegistry {
        &mut self.registry
    }

    /// Record one region's ranging report and forward the merged batch
    ///
    /// Reports for regions that are not monitored are ignored. An empty report
    /// is meaningful: it says the region currently has no beacons in range.
    pub fn on_ranged(&mut self, region: Uuid, beacons: Vec<BeaconSighting>) {
        if !self.registry.contains(&region) {
            debug!("Ignoring ranging report for unmonitored region {}", region);
            return;
        }
        self.latest.insert(region, beacons);
        self.forward();
    }

    /// Forget a region's last report (e.g. ranging stopped for it)
    pub fn clear_region(&mut self, region: &Uuid) {
        if self.latest.remove(region).is_some() {
            self.forward();
        }
    }

    /// Union of the latest reports across all regions
    pub fn current_batch(&self) -> Vec<BeaconSighting> {
        self.latest.values().flatten().cloned().collect()
    }

    fn forward(&self) {
        if let Some(sink) = &self.sink {
            sink.on_sightings(self.current_batch());
        }
    }
}

impl SightingSource for RangingAggregator {
    fn attach(&mut self, sink: Arc<dyn SightingSink>) {
        self.sink = Some(sink);
    }
}
