//! Test helpers for tagscan-nt integration tests
//!
//! Provides:
//! - Beacon/sighting builders on a fixed proximity UUID
//! - GatedResolver: catalog lookups that block until the test releases them
//! - PanickingResolver: lookups that never return normally
//! - EventRecorder: ChangeNotifier that keeps every event
//! - wait_until / wait_for_idle: poll helpers for background lookups

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tagscan_common::config::EngineConfig;
use tagscan_common::events::{ChangeNotifier, NearbyChangeTrigger, NearbyEvent};
use tagscan_common::{BeaconIdentity, BeaconSighting, HardwareTag};
use tagscan_nt::{NearbyTagManager, ResolveError, TagResolver};
use tokio::sync::Semaphore;
use uuid::Uuid;

pub const REGION: Uuid = Uuid::from_u128(0xCEFCC021_E45F_4520_A3AB_9D1EA22873AD);

pub fn beacon(minor: u16) -> BeaconIdentity {
    BeaconIdentity::new(REGION, 1, minor)
}

pub fn sighting(minor: u16) -> BeaconSighting {
    BeaconSighting::new(beacon(minor))
}

/// Catalog resolver whose lookups wait for a permit from the test
pub struct GatedResolver {
    catalog: HashMap<BeaconIdentity, HardwareTag>,
    gate: Semaphore,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl GatedResolver {
    pub fn new(catalog: impl IntoIterator<Item = (BeaconIdentity, HardwareTag)>) -> Self {
        Self {
            catalog: catalog.into_iter().collect(),
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    /// Let `n` blocked (or future) lookups through
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TagResolver for GatedResolver {
    async fn resolve(&self, beacon: &BeaconIdentity) -> Result<HardwareTag, ResolveError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ResolveError::Transport(e.to_string()))?;
        permit.forget();

        let result = self
            .catalog
            .get(beacon)
            .cloned()
            .ok_or(ResolveError::NotFound(*beacon));
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Resolver that panics on every lookup
pub struct PanickingResolver {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TagResolver for PanickingResolver {
    async fn resolve(&self, beacon: &BeaconIdentity) -> Result<HardwareTag, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("catalog backend exploded on {}", beacon);
    }
}

/// ChangeNotifier that records every event
#[derive(Default)]
pub struct EventRecorder {
    events: Mutex<Vec<NearbyEvent>>,
}

impl EventRecorder {
    pub fn events(&self) -> Vec<NearbyEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Triggers of all NearbyTagsChanged events, in order
    pub fn change_triggers(&self) -> Vec<NearbyChangeTrigger> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                NearbyEvent::NearbyTagsChanged { trigger, .. } => Some(trigger),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl ChangeNotifier for EventRecorder {
    fn publish(&self, event: NearbyEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Manager on the current runtime with a recording notifier
pub fn manager_with(
    resolver: Arc<dyn TagResolver>,
    config: EngineConfig,
) -> (NearbyTagManager, Arc<EventRecorder>) {
    let recorder = Arc::new(EventRecorder::default());
    let manager = NearbyTagManager::new(
        resolver,
        recorder.clone(),
        &config,
        tokio::runtime::Handle::current(),
    );
    (manager, recorder)
}

pub fn show_unassigned_config() -> EngineConfig {
    EngineConfig {
        show_unassigned: true,
        ..EngineConfig::default()
    }
}

/// Poll `condition` until it holds; panics after two seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached within 2s");
}

/// Wait until no lookups are in flight, then let completions publish
pub async fn wait_for_idle(manager: &NearbyTagManager) {
    wait_until(|| manager.pending_lookup_count() == 0).await;
    settle().await;
}

/// Give spawned tasks a chance to run
pub fn settle() -> impl Future<Output = ()> {
    tokio::time::sleep(Duration::from_millis(20))
}
