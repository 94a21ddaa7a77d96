//! Catalog lookup seam
//!
//! The engine asks a [`TagResolver`] to turn a beacon identity into a catalog
//! tag. Lookups are async and may complete in any order on any thread. Every
//! failure mode ends up as a [`ResolveError`], which the engine downgrades to
//! "unassigned" instead of propagating.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tagscan_common::{BeaconIdentity, HardwareTag};
use thiserror::Error;
use tracing::debug;

/// Why a lookup produced no catalog tag
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The catalog has no tag for this beacon
    #[error("No catalog entry for {0}")]
    NotFound(BeaconIdentity),

    /// Network or backend failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Lookup exceeded the configured timeout
    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),

    /// The catalog answered with something that is not an assigned tag
    #[error("Unusable catalog tag: {0}")]
    InvalidTag(String),
}

/// Resolver trait - catalog backends implement this
///
/// Implementations receive the full identity; the catalog's wire key is
/// [`BeaconIdentity::hardware_id`] plus major and minor.
#[async_trait]
pub trait TagResolver: Send + Sync {
    /// Look up the catalog tag for a beacon
    ///
    /// # Returns
    /// * `Ok(HardwareTag)` - Assigned tag (positive id, identifier present)
    /// * `Err(ResolveError)` - No usable match; the engine treats it as unassigned
    async fn resolve(&self, beacon: &BeaconIdentity) -> Result<HardwareTag, ResolveError>;
}

/// Run a lookup with an optional timeout and validate the answer
pub(crate) async fn resolve_checked(
    resolver: &dyn TagResolver,
    beacon: &BeaconIdentity,
    timeout: Option<Duration>,
) -> Result<HardwareTag, ResolveError> {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, resolver.resolve(beacon)).await {
            Ok(result) => result,
            Err(_) => Err(ResolveError::Timeout(limit)),
        },
        None => resolver.resolve(beacon).await,
    };

    let tag = result?;
    if tag.identifier.is_none() {
        return Err(ResolveError::InvalidTag(format!(
            "tag {} for {} has no identifier",
            tag.id, beacon
        )));
    }
    if tag.id <= 0 {
        return Err(ResolveError::InvalidTag(format!(
            "tag id {} for {} is not a catalog id",
            tag.id, beacon
        )));
    }
    Ok(tag)
}

/// In-memory catalog keyed by beacon identity
///
/// Backs the simulator and tests. Optional artificial latency makes lookups
/// overlap with later sighting batches the way real network calls do.
#[derive(Default)]
pub struct StaticCatalogResolver {
    entries: RwLock<HashMap<BeaconIdentity, HardwareTag>>,
    latency: Option<Duration>,
    lookups: AtomicUsize,
}

impl StaticCatalogResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register (or replace) the catalog tag for a beacon
    pub fn insert(&self, beacon: BeaconIdentity, tag: HardwareTag) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(beacon, tag);
    }

    /// Total lookups served, including misses
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl FromIterator<(BeaconIdentity, HardwareTag)> for StaticCatalogResolver {
    fn from_iter<I: IntoIterator<Item = (BeaconIdentity, HardwareTag)>>(iter: I) -> Self {
        Self {
            entries: RwLock::new(iter.into_iter().collect()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl TagResolver for StaticCatalogResolver {
    async fn resolve(&self, beacon: &BeaconIdentity) -> Result<HardwareTag, ResolveError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match entries.get(beacon) {
            Some(tag) => {
                debug!("Catalog hit for {} -> tag {}", beacon, tag.id);
                Ok(tag.clone())
            }
            None => Err(ResolveError::NotFound(*beacon)),
        }
    }
}
