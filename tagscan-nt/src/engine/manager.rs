//! Thread-safe nearby-tag manager
//!
//! Wraps [`NearbyState`] in a `std::sync::RwLock` so UI threads can snapshot
//! the collection while the ranging callback and lookup completions mutate it.
//! No guard is ever held across an await.
//!
//! **Flow per sighting batch:**
//! 1. Take the write lock once; refresh, mark pending, evict
//! 2. Publish at most one change event, still under the lock
//! 3. Release the lock, spawn one lookup task per newly pending beacon
//!
//! Lookup completions re-enter through their own write lock and publish their
//! own change event when they insert. Events are published under the write
//! lock so their counts arrive in the order the changes were applied.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tagscan_common::config::EngineConfig;
use tagscan_common::events::{ChangeNotifier, NearbyChangeTrigger, NearbyEvent};
use tagscan_common::{BeaconIdentity, BeaconSighting, HardwareTag};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::state::{InsertOutcome, LookupTicket, NearbyState};
use crate::ranging::SightingSink;
use crate::resolver::{resolve_checked, ResolveError, TagResolver};
use crate::{Error, Result};

/// Reconciliation engine owning the nearby collection
///
/// Cheap to clone; clones share the same collection.
#[derive(Clone)]
pub struct NearbyTagManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    state: RwLock<NearbyState>,
    resolver: Arc<dyn TagResolver>,
    notifier: Arc<dyn ChangeNotifier>,
    runtime: Handle,
    lookup_timeout: Option<Duration>,
}

impl NearbyTagManager {
    /// Create a manager
    ///
    /// # Arguments
    /// * `resolver` - Catalog lookup backend
    /// * `notifier` - Receives change events (an `EventBus` or a closure); it is
    ///   called with the collection locked and must not call back into the manager
    /// * `config` - Initial display mode and lookup timeout
    /// * `runtime` - Runtime the lookup tasks are spawned on
    pub fn new(
        resolver: Arc<dyn TagResolver>,
        notifier: Arc<dyn ChangeNotifier>,
        config: &EngineConfig,
        runtime: Handle,
    ) -> Self {
        info!(
            "Nearby tag manager created (show_unassigned={}, lookup_timeout={:?})",
            config.show_unassigned,
            config.lookup_timeout()
        );
        Self {
            inner: Arc::new(ManagerInner {
                state: RwLock::new(NearbyState::new(config.show_unassigned)),
                resolver,
                notifier,
                runtime,
                lookup_timeout: config.lookup_timeout(),
            }),
        }
    }

    /// Apply the ranging subsystem's current view of nearby beacons
    ///
    /// Not a diff: beacons missing from `sightings` are treated as gone.
    /// Returns immediately; catalog lookups for new beacons run in the
    /// background.
    pub fn process_sighting_batch<I, S>(&self, sightings: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<BeaconSighting>,
    {
        let sightings: Vec<BeaconSighting> = sightings.into_iter().map(Into::into).collect();
        let batch_size = sightings.len();

        let outcome = {
            let mut state = self.inner.write();
            if !state.is_accepting() {
                debug!("Ignoring sighting batch of {} after shutdown", batch_size);
                return;
            }
            let outcome = state.apply_batch(sightings);
            if outcome.changed() {
                self.inner
                    .publish_change(&state, NearbyChangeTrigger::SightingBatch);
            }
            outcome
        };

        debug!(
            "Batch of {}: {} refreshed, {} new lookups, {} already pending, {} evicted",
            batch_size,
            outcome.refreshed,
            outcome.lookups.len(),
            outcome.skipped_pending,
            outcome.evicted.len()
        );

        for (sighting, ticket) in outcome.lookups {
            self.spawn_lookup(sighting, ticket);
        }
    }

    /// Point-in-time snapshot of the nearby tags under the current display mode
    pub fn nearby_tags(&self) -> Vec<HardwareTag> {
        self.inner.read().visible()
    }

    /// All unassigned placeholders currently in the collection
    pub fn unassigned_tags(&self) -> Vec<HardwareTag> {
        self.inner.read().unassigned()
    }

    /// Visible tag at `index`; `None` when out of range
    pub fn tag_at(&self, index: usize) -> Option<HardwareTag> {
        self.inner.read().visible_at(index)
    }

    /// Show or hide unassigned placeholders
    ///
    /// Changing the mode resets the collection: hidden placeholders were never
    /// created, so they cannot be shown retroactively, and visible ones must go.
    /// Setting the current mode again is a no-op.
    pub fn set_display_mode(&self, show_unassigned: bool) {
        let cleared = {
            let mut state = self.inner.write();
            if !state.set_show_unassigned(show_unassigned) {
                return;
            }
            let cleared = state.reset();
            self.inner.notifier.publish(NearbyEvent::DisplayModeChanged {
                show_unassigned,
                timestamp: chrono::Utc::now(),
            });
            if cleared > 0 {
                self.inner.publish_change(&state, NearbyChangeTrigger::Reset);
            }
            cleared
        };

        info!(
            "Display mode changed (show_unassigned={}), cleared {} tags",
            show_unassigned, cleared
        );
    }

    /// Whether unassigned placeholders are currently shown
    pub fn shows_unassigned(&self) -> bool {
        self.inner.read().show_unassigned()
    }

    /// Clear the collection and pending lookups
    ///
    /// Lookups already in flight are not cancelled; their results are ignored.
    pub fn reset(&self) {
        let cleared = {
            let mut state = self.inner.write();
            let cleared = state.reset();
            if cleared > 0 {
                self.inner.publish_change(&state, NearbyChangeTrigger::Reset);
            }
            cleared
        };

        debug!("Reset cleared {} tags", cleared);
    }

    /// Reset and stop accepting batches, lookups, and manual inserts
    pub fn shutdown(&self) {
        let cleared = {
            let mut state = self.inner.write();
            if !state.is_accepting() {
                return;
            }
            let cleared = state.shut_down();
            if cleared > 0 {
                self.inner.publish_change(&state, NearbyChangeTrigger::Reset);
            }
            cleared
        };

        info!("Nearby tag manager shut down ({} tags cleared)", cleared);
    }

    /// Number of beacons with a catalog lookup in flight
    pub fn pending_lookup_count(&self) -> usize {
        self.inner.read().pending_count()
    }

    /// Whether a lookup for `identity` is in flight
    pub fn is_lookup_pending(&self, identity: &BeaconIdentity) -> bool {
        self.inner.read().is_pending(identity)
    }

    /// Resolve a beacon directly and insert its tag if the catalog knows it
    ///
    /// For demos and simulators where no ranging hardware is available. The
    /// inserted tag is subject to normal eviction by the next batch. If the
    /// beacon already has a tag, that tag's beacon metadata is refreshed and
    /// the resolved tag is returned.
    ///
    /// # Errors
    /// * [`Error::Resolve`] - The catalog has no usable tag for the beacon
    /// * [`Error::ShutDown`] - The manager was shut down before the insert
    pub async fn add_tag_by_hardware_id(&self, identity: BeaconIdentity) -> Result<HardwareTag> {
        if !self.inner.read().is_accepting() {
            return Err(Error::ShutDown);
        }

        let tag = resolve_checked(
            self.inner.resolver.as_ref(),
            &identity,
            self.inner.lookup_timeout,
        )
        .await?
        .with_beacon(BeaconSighting::new(identity));

        let outcome = {
            let mut state = self.inner.write();
            let outcome = state.insert_manual(tag.clone());
            if let InsertOutcome::Inserted { .. } = outcome {
                self.inner
                    .publish_change(&state, NearbyChangeTrigger::ManualInsert);
            }
            outcome
        };

        match outcome {
            InsertOutcome::Inserted { tag_id } => {
                info!("Manually added tag {} for {}", tag_id, identity);
                Ok(tag)
            }
            InsertOutcome::Refreshed { tag_id } => {
                debug!("{} already bound to tag {}", identity, tag_id);
                Ok(tag)
            }
            InsertOutcome::Discarded(reason) => {
                debug!("Manual add for {} discarded: {:?}", identity, reason);
                Err(Error::ShutDown)
            }
        }
    }

    fn spawn_lookup(&self, sighting: BeaconSighting, ticket: LookupTicket) {
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let identity = sighting.identity;
            let guard = PendingGuard {
                inner: Arc::clone(&inner),
                sighting: Some(sighting),
                ticket,
            };

            debug!("Looking up {} ({})", identity, identity.hardware_id());
            let result =
                resolve_checked(inner.resolver.as_ref(), &identity, inner.lookup_timeout).await;
            guard.complete(result);
        });
    }
}

impl SightingSink for NearbyTagManager {
    fn on_sightings(&self, batch: Vec<BeaconSighting>) {
        self.process_sighting_batch(batch);
    }
}

impl ManagerInner {
    fn read(&self) -> RwLockReadGuard<'_, NearbyState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, NearbyState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a change event with counts taken from `state`
    ///
    /// Callers hold the write lock, so events leave in the order the changes
    /// were applied.
    fn publish_change(&self, state: &NearbyState, trigger: NearbyChangeTrigger) {
        let counts = state.counts();
        self.notifier.publish(NearbyEvent::NearbyTagsChanged {
            trigger,
            visible_count: counts.visible,
            assigned_count: counts.assigned,
            timestamp: chrono::Utc::now(),
        });
    }

    fn complete_lookup(
        &self,
        sighting: BeaconSighting,
        ticket: LookupTicket,
        result: std::result::Result<HardwareTag, ResolveError>,
    ) {
        let identity = sighting.identity;
        if let Err(e) = &result {
            debug!("Lookup for {} unresolved: {}", identity, e);
        }

        let outcome = {
            let mut state = self.write();
            let outcome = state.complete_lookup(sighting, ticket, result);
            if let InsertOutcome::Inserted { .. } = outcome {
                self.publish_change(&state, NearbyChangeTrigger::LookupCompleted);
            }
            outcome
        };

        match outcome {
            InsertOutcome::Inserted { tag_id } => {
                debug!("Inserted tag {} for {}", tag_id, identity);
            }
            InsertOutcome::Refreshed { tag_id } => {
                debug!("Lookup for {} refreshed existing tag {}", identity, tag_id);
            }
            InsertOutcome::Discarded(reason) => {
                debug!("Lookup for {} discarded: {:?}", identity, reason);
            }
        }
    }
}

/// Completes a lookup even when its task ends without a result
///
/// A resolver that panics, or a task the runtime drops, completes as a
/// transport failure so the beacon degrades to unassigned like any other
/// failed lookup.
struct PendingGuard {
    inner: Arc<ManagerInner>,
    sighting: Option<BeaconSighting>,
    ticket: LookupTicket,
}

impl PendingGuard {
    fn complete(mut self, result: std::result::Result<HardwareTag, ResolveError>) {
        if let Some(sighting) = self.sighting.take() {
            self.inner.complete_lookup(sighting, self.ticket, result);
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Some(sighting) = self.sighting.take() else {
            return;
        };
        warn!("Lookup for {} ended without a result", sighting.identity);
        self.inner.complete_lookup(
            sighting,
            self.ticket,
            Err(ResolveError::Transport("lookup aborted".to_string())),
        );
    }
}
