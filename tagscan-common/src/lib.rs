//! # tagscan Common Library
//!
//! Shared code for the tagscan crates including:
//! - Beacon identity and sighting types
//! - Hardware tag model (assigned tags and local placeholders)
//! - Event types (NearbyEvent enum) and the EventBus
//! - Configuration loading
//! - Error types

pub mod beacon;
pub mod config;
pub mod error;
pub mod events;
pub mod tag;

pub use beacon::{BeaconIdentity, BeaconSighting, Proximity};
pub use error::{Error, Result};
pub use tag::HardwareTag;
