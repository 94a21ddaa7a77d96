//! Nearby collection state and the reconciliation algorithm
//!
//! Pure data manipulation with no locking and no I/O. [`super::NearbyTagManager`]
//! owns one `NearbyState` behind a reader/writer lock and turns the outcomes
//! returned here into lookups and change events.
//!
//! **Invariants:**
//! - At most one tag per beacon identity in `tags`
//! - At most one pending ticket per identity
//! - Placeholder ids strictly decrease for the lifetime of the state

use std::collections::{HashMap, HashSet};

use tagscan_common::{BeaconIdentity, BeaconSighting, HardwareTag};

use crate::resolver::ResolveError;

/// Identifies one issued lookup; completions carrying a ticket that is no
/// longer pending are ignored
pub(crate) type LookupTicket = u64;

/// Result of applying one sighting batch
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    /// Lookups to issue, one per identity newly marked pending
    pub lookups: Vec<(BeaconSighting, LookupTicket)>,
    /// Existing tags whose beacon metadata was replaced
    pub refreshed: usize,
    /// Identities skipped because a lookup was already in flight
    pub skipped_pending: usize,
    /// Ids of tags removed because their beacon was absent
    pub evicted: Vec<i64>,
}

impl BatchOutcome {
    /// Whether the collection changed structurally
    pub fn changed(&self) -> bool {
        !self.evicted.is_empty()
    }
}

/// What happened to a lookup result or manual insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InsertOutcome {
    /// A new tag was appended to the collection
    Inserted { tag_id: i64 },
    /// A tag for the identity already existed; its beacon was refreshed
    Refreshed { tag_id: i64 },
    /// Nothing was inserted
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiscardReason {
    /// Ticket no longer pending (reset or shutdown happened meanwhile)
    Stale,
    /// Unresolved beacon while unassigned tags are hidden
    Hidden,
    /// Engine no longer accepts input
    ShutDown,
}

/// Tag counts captured under the same lock as the change they describe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CollectionCounts {
    pub visible: usize,
    pub assigned: usize,
}

#[derive(Debug)]
pub(crate) struct NearbyState {
    /// Insertion-ordered nearby collection
    tags: Vec<HardwareTag>,
    /// Identities with a lookup in flight
    pending: HashMap<BeaconIdentity, LookupTicket>,
    show_unassigned: bool,
    next_unassigned_id: i64,
    next_ticket: LookupTicket,
    accepting: bool,
}

impl NearbyState {
    pub fn new(show_unassigned: bool) -> Self {
        Self {
            tags: Vec::new(),
            pending: HashMap::new(),
            show_unassigned,
            next_unassigned_id: -1,
            next_ticket: 1,
            accepting: true,
        }
    }

    /// Apply one ranging batch: refresh known tags, mark unknown beacons
    /// pending, evict tags whose beacon is absent
    ///
    /// Duplicate identities within the batch collapse to the last sighting.
    pub fn apply_batch(&mut self, sightings: Vec<BeaconSighting>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if !self.accepting {
            return outcome;
        }

        let mut order: Vec<BeaconIdentity> = Vec::with_capacity(sightings.len());
        let mut latest: HashMap<BeaconIdentity, BeaconSighting> =
            HashMap::with_capacity(sightings.len());
        for sighting in sightings {
            let identity = sighting.identity;
            if latest.insert(identity, sighting).is_none() {
                order.push(identity);
            }
        }

        for identity in &order {
            let Some(sighting) = latest.get(identity) else {
                continue;
            };

            if let Some(tag) = self.tag_for_mut(identity) {
                tag.beacon = Some(sighting.clone());
                outcome.refreshed += 1;
            } else if self.pending.contains_key(identity) {
                outcome.skipped_pending += 1;
            } else {
                let ticket = self.issue_ticket(*identity);
                outcome.lookups.push((sighting.clone(), ticket));
            }
        }

        let present: HashSet<BeaconIdentity> = order.into_iter().collect();
        outcome.evicted = self
            .tags
            .iter()
            .filter(|tag| match tag.beacon_identity() {
                Some(identity) => !present.contains(&identity),
                None => true,
            })
            .map(|tag| tag.id)
            .collect();

        if !outcome.evicted.is_empty() {
            let evicted: HashSet<i64> = outcome.evicted.iter().copied().collect();
            self.tags.retain(|tag| !evicted.contains(&tag.id));
        }

        outcome
    }

    /// Apply a finished lookup
    ///
    /// Only the ticket that is currently pending for the identity is honored.
    /// A completion for a beacon that was evicted meanwhile still inserts; the
    /// next batch evicts it again if the beacon is really gone.
    pub fn complete_lookup(
        &mut self,
        sighting: BeaconSighting,
        ticket: LookupTicket,
        result: Result<HardwareTag, ResolveError>,
    ) -> InsertOutcome {
        let identity = sighting.identity;
        match self.pending.get(&identity) {
            Some(current) if *current == ticket => {
                self.pending.remove(&identity);
            }
            _ => return InsertOutcome::Discarded(DiscardReason::Stale),
        }

        if !self.accepting {
            return InsertOutcome::Discarded(DiscardReason::ShutDown);
        }

        match result {
            Ok(tag) => self.insert_or_refresh(tag.with_beacon(sighting)),
            Err(_) if !self.show_unassigned => InsertOutcome::Discarded(DiscardReason::Hidden),
            Err(_) => {
                if let Some(tag_id) = self.refresh_existing(&sighting) {
                    return InsertOutcome::Refreshed { tag_id };
                }
                let id = self.take_unassigned_id();
                self.insert_or_refresh(HardwareTag::unassigned(id, sighting))
            }
        }
    }

    /// Insert a tag obtained outside the ranging path
    pub fn insert_manual(&mut self, tag: HardwareTag) -> InsertOutcome {
        if !self.accepting {
            return InsertOutcome::Discarded(DiscardReason::ShutDown);
        }
        self.insert_or_refresh(tag)
    }

    /// Clear tags and pending lookups; returns how many tags were removed
    ///
    /// The placeholder id counter keeps counting so ids never repeat.
    pub fn reset(&mut self) -> usize {
        let removed = self.tags.len();
        self.tags.clear();
        self.pending.clear();
        removed
    }

    /// Reset and refuse further input
    pub fn shut_down(&mut self) -> usize {
        self.accepting = false;
        self.reset()
    }

    /// Set the display mode; returns whether it changed
    pub fn set_show_unassigned(&mut self, show: bool) -> bool {
        if self.show_unassigned == show {
            return false;
        }
        self.show_unassigned = show;
        true
    }

    pub fn show_unassigned(&self) -> bool {
        self.show_unassigned
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Tags visible under the current display mode
    pub fn visible(&self) -> Vec<HardwareTag> {
        if self.show_unassigned {
            self.tags.clone()
        } else {
            self.tags.iter().filter(|t| t.is_assigned()).cloned().collect()
        }
    }

    /// Visible tag at `index`, without cloning the whole collection
    pub fn visible_at(&self, index: usize) -> Option<HardwareTag> {
        if self.show_unassigned {
            self.tags.get(index).cloned()
        } else {
            self.tags.iter().filter(|t| t.is_assigned()).nth(index).cloned()
        }
    }

    pub fn unassigned(&self) -> Vec<HardwareTag> {
        self.tags.iter().filter(|t| !t.is_assigned()).cloned().collect()
    }

    pub fn counts(&self) -> CollectionCounts {
        let assigned = self.tags.iter().filter(|t| t.is_assigned()).count();
        CollectionCounts {
            visible: if self.show_unassigned { self.tags.len() } else { assigned },
            assigned,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, identity: &BeaconIdentity) -> bool {
        self.pending.contains_key(identity)
    }

    fn issue_ticket(&mut self, identity: BeaconIdentity) -> LookupTicket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(identity, ticket);
        ticket
    }

    fn take_unassigned_id(&mut self) -> i64 {
        let id = self.next_unassigned_id;
        self.next_unassigned_id -= 1;
        id
    }

    fn tag_for_mut(&mut self, identity: &BeaconIdentity) -> Option<&mut HardwareTag> {
        self.tags
            .iter_mut()
            .find(|tag| tag.beacon_identity().as_ref() == Some(identity))
    }

    fn refresh_existing(&mut self, sighting: &BeaconSighting) -> Option<i64> {
        let tag = self.tag_for_mut(&sighting.identity)?;
        tag.beacon = Some(sighting.clone());
        Some(tag.id)
    }

    /// Append `tag` unless its beacon is already bound, in which case only the
    /// beacon metadata of the existing tag is refreshed
    fn insert_or_refresh(&mut self, tag: HardwareTag) -> InsertOutcome {
        if let Some(sighting) = tag.beacon.as_ref() {
            if let Some(tag_id) = self.refresh_existing(sighting) {
                return InsertOutcome::Refreshed { tag_id };
            }
        }
        let tag_id = tag.id;
        self.tags.push(tag);
        InsertOutcome::Inserted { tag_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagscan_common::Proximity;
    use uuid::Uuid;

    fn beacon(minor: u16) -> BeaconIdentity {
        BeaconIdentity::new(Uuid::from_u128(0xCEFCC021_E45F_4520_A3AB_9D1EA22873AD), 1, minor)
    }

    fn sighting(minor: u16) -> BeaconSighting {
        BeaconSighting::new(beacon(minor))
    }

    fn not_found(minor: u16) -> Result<HardwareTag, ResolveError> {
        Err(ResolveError::NotFound(beacon(minor)))
    }

    /// Run one batch and complete all of its lookups with `resolve`
    fn run_batch(
        state: &mut NearbyState,
        minors: &[u16],
        resolve: impl Fn(u16) -> Result<HardwareTag, ResolveError>,
    ) -> BatchOutcome {
        let outcome = state.apply_batch(minors.iter().map(|m| sighting(*m)).collect());
        for (s, ticket) in &outcome.lookups {
            let minor = s.identity.minor;
            state.complete_lookup(s.clone(), *ticket, resolve(minor));
        }
        outcome
    }

    #[test]
    fn test_new_beacon_becomes_pending() {
        let mut state = NearbyState::new(true);
        let outcome = state.apply_batch(vec![sighting(1)]);

        assert_eq!(outcome.lookups.len(), 1);
        assert!(state.is_pending(&beacon(1)));
        assert!(state.visible().is_empty());
        assert!(!outcome.changed());
    }

    #[test]
    fn test_pending_beacon_is_not_looked_up_twice() {
        let mut state = NearbyState::new(true);
        let first = state.apply_batch(vec![sighting(1)]);
        let second = state.apply_batch(vec![sighting(1)]);

        assert_eq!(first.lookups.len(), 1);
        assert!(second.lookups.is_empty());
        assert_eq!(second.skipped_pending, 1);
        assert_eq!(state.pending_count(), 1);
    }

    #[test]
    fn test_duplicates_within_batch_collapse_to_last() {
        let mut state = NearbyState::new(true);
        let batch = vec![
            sighting(1).with_rssi(-80),
            sighting(2),
            sighting(1).with_rssi(-40),
        ];
        let outcome = state.apply_batch(batch);

        assert_eq!(outcome.lookups.len(), 2);
        let (first, _) = &outcome.lookups[0];
        assert_eq!(first.identity, beacon(1));
        assert_eq!(first.rssi, Some(-40));
    }

    #[test]
    fn test_resolved_lookup_inserts_assigned_tag() {
        let mut state = NearbyState::new(false);
        run_batch(&mut state, &[1], |_| Ok(HardwareTag::assigned(42, "abc")));

        let tags = state.visible();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, 42);
        assert_eq!(tags[0].beacon_identity(), Some(beacon(1)));
        assert_eq!(state.pending_count(), 0);
    }

    #[test]
    fn test_refresh_updates_metadata_in_place() {
        let mut state = NearbyState::new(true);
        run_batch(&mut state, &[1], |_| Ok(HardwareTag::assigned(42, "abc")));

        let refreshed = sighting(1).with_rssi(-55).with_proximity(Proximity::Immediate);
        let outcome = state.apply_batch(vec![refreshed.clone()]);

        assert_eq!(outcome.refreshed, 1);
        assert!(outcome.lookups.is_empty());
        assert!(!outcome.changed());
        assert_eq!(state.visible()[0].beacon.as_ref(), Some(&refreshed));
    }

    #[test]
    fn test_absent_beacon_is_evicted_by_id() {
        let mut state = NearbyState::new(true);
        run_batch(&mut state, &[1, 2], |m| {
            if m == 1 {
                Ok(HardwareTag::assigned(42, "abc"))
            } else {
                not_found(m)
            }
        });
        assert_eq!(state.visible().len(), 2);

        let outcome = state.apply_batch(vec![sighting(2)]);
        assert_eq!(outcome.evicted, vec![42]);
        assert!(outcome.changed());

        let tags = state.visible();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, -1);
    }

    #[test]
    fn test_unresolved_hidden_in_assigned_only_mode() {
        let mut state = NearbyState::new(false);
        let outcome = state.apply_batch(vec![sighting(5)]);
        let (s, ticket) = outcome.lookups[0].clone();

        let result = state.complete_lookup(s, ticket, not_found(5));
        assert_eq!(result, InsertOutcome::Discarded(DiscardReason::Hidden));
        assert!(state.visible().is_empty());
        assert!(state.unassigned().is_empty());
        assert_eq!(state.pending_count(), 0);
    }

    #[test]
    fn test_placeholder_ids_strictly_decrease() {
        let mut state = NearbyState::new(true);
        run_batch(&mut state, &[1, 2, 3], not_found);

        let ids: Vec<i64> = state.visible().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![-1, -2, -3]);
    }

    #[test]
    fn test_placeholder_ids_not_reused_after_reset() {
        let mut state = NearbyState::new(true);
        run_batch(&mut state, &[1], not_found);
        state.reset();
        run_batch(&mut state, &[1], not_found);

        assert_eq!(state.visible()[0].id, -2);
    }

    #[test]
    fn test_stale_ticket_after_reset_is_ignored() {
        let mut state = NearbyState::new(true);
        let outcome = state.apply_batch(vec![sighting(1)]);
        let (s, old_ticket) = outcome.lookups[0].clone();

        state.reset();
        let again = state.apply_batch(vec![sighting(1)]);
        let (_, new_ticket) = again.lookups[0].clone();
        assert_ne!(old_ticket, new_ticket);

        let stale = state.complete_lookup(s.clone(), old_ticket, Ok(HardwareTag::assigned(7, "x")));
        assert_eq!(stale, InsertOutcome::Discarded(DiscardReason::Stale));
        assert!(state.is_pending(&beacon(1)));

        let fresh = state.complete_lookup(s, new_ticket, Ok(HardwareTag::assigned(7, "x")));
        assert_eq!(fresh, InsertOutcome::Inserted { tag_id: 7 });
    }

    #[test]
    fn test_completion_after_eviction_reinserts() {
        let mut state = NearbyState::new(true);
        let outcome = state.apply_batch(vec![sighting(1)]);
        let (s, ticket) = outcome.lookups[0].clone();

        // beacon disappears before the lookup finishes
        state.apply_batch(vec![]);
        let result = state.complete_lookup(s, ticket, Ok(HardwareTag::assigned(42, "abc")));
        assert_eq!(result, InsertOutcome::Inserted { tag_id: 42 });

        // and the next batch corrects it
        let outcome = state.apply_batch(vec![]);
        assert_eq!(outcome.evicted, vec![42]);
        assert!(state.visible().is_empty());
    }

    #[test]
    fn test_failed_lookup_retried_on_next_sighting() {
        let mut state = NearbyState::new(false);
        run_batch(&mut state, &[9], not_found);

        let outcome = state.apply_batch(vec![sighting(9)]);
        assert_eq!(outcome.lookups.len(), 1);
    }

    #[test]
    fn test_manual_insert_respects_identity_uniqueness() {
        let mut state = NearbyState::new(true);
        run_batch(&mut state, &[1], |_| Ok(HardwareTag::assigned(42, "abc")));

        let dup = HardwareTag::assigned(99, "other").with_beacon(sighting(1).with_rssi(-70));
        assert_eq!(state.insert_manual(dup), InsertOutcome::Refreshed { tag_id: 42 });
        assert_eq!(state.visible().len(), 1);
        assert_eq!(state.visible()[0].beacon.as_ref().unwrap().rssi, Some(-70));
    }

    #[test]
    fn test_tag_without_beacon_is_evicted() {
        let mut state = NearbyState::new(true);
        state.insert_manual(HardwareTag::assigned(3, "floating"));
        let outcome = state.apply_batch(vec![]);
        assert_eq!(outcome.evicted, vec![3]);
    }

    #[test]
    fn test_visible_filters_by_mode() {
        let mut state = NearbyState::new(true);
        run_batch(&mut state, &[1, 2], |m| {
            if m == 1 {
                Ok(HardwareTag::assigned(42, "abc"))
            } else {
                not_found(m)
            }
        });
        assert_eq!(state.counts(), CollectionCounts { visible: 2, assigned: 1 });
        assert_eq!(state.unassigned().len(), 1);
        assert_eq!(state.visible_at(1).map(|t| t.id), Some(-1));
        assert!(state.visible_at(2).is_none());

        // flip without reset only to exercise the filter
        state.set_show_unassigned(false);
        assert_eq!(state.visible().len(), 1);
        assert_eq!(state.visible_at(0).map(|t| t.id), Some(42));
        assert!(state.visible_at(1).is_none());
        assert_eq!(state.counts(), CollectionCounts { visible: 1, assigned: 1 });
    }

    #[test]
    fn test_shut_down_rejects_input() {
        let mut state = NearbyState::new(true);
        let outcome = state.apply_batch(vec![sighting(1)]);
        let (s, ticket) = outcome.lookups[0].clone();

        state.shut_down();
        assert!(!state.is_accepting());
        assert!(state.apply_batch(vec![sighting(2)]).lookups.is_empty());
        assert_eq!(
            state.complete_lookup(s, ticket, not_found(1)),
            InsertOutcome::Discarded(DiscardReason::Stale)
        );
        assert_eq!(
            state.insert_manual(HardwareTag::assigned(1, "x")),
            InsertOutcome::Discarded(DiscardReason::ShutDown)
        );
    }
}
