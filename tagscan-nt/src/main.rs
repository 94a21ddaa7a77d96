//! Nearby Tags simulator (tagscan-nt) - Main entry point
//!
//! Replays a scenario file through the reconciliation engine: each batch is
//! split per monitored region and fed through the ranging aggregator, exactly
//! as a platform ranging callback would. After every batch the visible tags
//! are printed to stdout as one JSON line. Engine events go to the log.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tagscan_common::config::EngineConfig;
use tagscan_common::events::{ChangeNotifier, EventBus, NearbyEvent};
use tagscan_common::BeaconSighting;
use tagscan_nt::ranging::{RangingAggregator, RegionRegistry, SightingSource};
use tagscan_nt::scenario::{Scenario, ScenarioStep};
use tagscan_nt::NearbyTagManager;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for tagscan-nt
#[derive(Parser, Debug)]
#[command(name = "tagscan-nt")]
#[command(about = "Replay beacon sighting scenarios through the nearby-tags engine")]
#[command(version)]
struct Args {
    /// Scenario file (TOML)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Config file path (overrides default location)
    #[arg(short, long, env = "TAGSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Start with unassigned placeholders shown
    #[arg(long)]
    show_unassigned: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        EngineConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    if args.show_unassigned {
        config.show_unassigned = true;
    }

    // Initialize tracing; RUST_LOG wins over the configured level
    let default_filter = format!(
        "tagscan_nt={level},tagscan_common={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    let steps = scenario.steps().context("Invalid scenario batches")?;
    let resolver = Arc::new(scenario.build_resolver().context("Invalid scenario catalog")?);

    info!(
        "Replaying {} batches every {:?} (show_unassigned={})",
        steps.len(),
        scenario.interval(),
        config.show_unassigned
    );

    let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
    let event_logger = tokio::spawn(log_events(event_bus.subscribe()));
    let notifier: Arc<dyn ChangeNotifier> = event_bus.clone();

    let manager = NearbyTagManager::new(
        resolver.clone(),
        Arc::clone(&notifier),
        &config,
        tokio::runtime::Handle::current(),
    );

    let mut registry =
        RegionRegistry::new(config.max_monitored_regions).with_notifier(Arc::clone(&notifier));
    let added = registry.add_server_uuids(scenario.region_ids()?.as_slice());
    info!("Monitoring {} regions", added.len());

    let mut aggregator = RangingAggregator::new(registry);
    aggregator.attach(Arc::new(manager.clone()));

    tokio::select! {
        result = replay(&manager, &mut aggregator, &steps, &scenario) => {
            result?;
            info!("Scenario complete ({} catalog lookups)", resolver.lookup_count());
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    manager.shutdown();
    drop(aggregator);
    drop(manager);
    drop(notifier);
    drop(event_bus);
    if let Err(e) = event_logger.await {
        warn!("Event logger task failed: {}", e);
    }

    Ok(())
}

async fn replay(
    manager: &NearbyTagManager,
    aggregator: &mut RangingAggregator,
    steps: &[ScenarioStep],
    scenario: &Scenario,
) -> Result<()> {
    for (index, step) in steps.iter().enumerate() {
        if let Some(show_unassigned) = step.show_unassigned {
            manager.set_display_mode(show_unassigned);
        }

        for (region, beacons) in split_by_region(aggregator.registry().uuids(), &step.sightings) {
            aggregator.on_ranged(region, beacons);
        }

        tokio::time::sleep(scenario.interval()).await;

        let snapshot = serde_json::json!({
            "batch": index + 1,
            "show_unassigned": manager.shows_unassigned(),
            "pending_lookups": manager.pending_lookup_count(),
            "tags": manager.nearby_tags(),
        });
        println!(
            "{}",
            serde_json::to_string(&snapshot).context("Failed to serialize snapshot")?
        );
    }
    Ok(())
}

/// Group a batch into one report per monitored region
///
/// Every monitored region gets a report, empty when none of its beacons are in
/// range. Sightings from unmonitored regions are kept under their own UUID so
/// the aggregator can decide what to do with them.
fn split_by_region(
    regions: &[Uuid],
    sightings: &[BeaconSighting],
) -> Vec<(Uuid, Vec<BeaconSighting>)> {
    let mut grouped: HashMap<Uuid, Vec<BeaconSighting>> =
        regions.iter().map(|uuid| (*uuid, Vec::new())).collect();
    for sighting in sightings {
        grouped
            .entry(sighting.identity.uuid)
            .or_default()
            .push(sighting.clone());
    }

    let mut reports: Vec<_> = grouped.into_iter().collect();
    reports.sort_by_key(|(uuid, _)| *uuid);
    reports
}

/// Log engine events until the bus closes
async fn log_events(mut rx: broadcast::Receiver<NearbyEvent>) {
    loop {
        match rx.recv().await {
            Ok(NearbyEvent::NearbyTagsChanged {
                trigger,
                visible_count,
                assigned_count,
                ..
            }) => {
                info!(
                    "Nearby tags changed ({}): {} visible, {} assigned",
                    trigger, visible_count, assigned_count
                );
            }
            Ok(NearbyEvent::DisplayModeChanged { show_unassigned, .. }) => {
                info!("Display mode changed: show_unassigned={}", show_unassigned);
            }
            Ok(NearbyEvent::RegionsAdded { uuids, .. }) => {
                debug!("Regions added: {:?}", uuids);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event logger lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => {
                debug!("Event bus closed, stopping event logger");
                break;
            }
        }
    }
}
