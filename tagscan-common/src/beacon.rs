//! Beacon identity and sighting types
//!
//! A beacon is identified by the triple (proximity UUID, major, minor). The
//! triple is the join key between ranging reports and resolved tags.
//!
//! Hardware ids travel to the catalog as the proximity UUID without dashes,
//! uppercase hex (e.g. `CEFCC021E45F4520A3AB9D1EA22873AD`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Identity triple broadcast by a beacon
///
/// Equality is structural. Two sightings of the same physical beacon always
/// produce equal identities regardless of signal metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeaconIdentity {
    /// Proximity UUID shared by all beacons of a region
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
}

impl BeaconIdentity {
    pub const fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self { uuid, major, minor }
    }

    /// Build an identity from a wire hardware id (dashed or undashed, any case)
    pub fn from_hardware_id(hardware_id: &str, major: u16, minor: u16) -> Result<Self> {
        Ok(Self::new(parse_hardware_id(hardware_id)?, major, minor))
    }

    /// Proximity UUID in wire format: no dashes, uppercase hex
    pub fn hardware_id(&self) -> String {
        self.uuid.simple().to_string().to_uppercase()
    }
}

impl fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.uuid.hyphenated().to_string().to_uppercase(),
            self.major,
            self.minor
        )
    }
}

/// Parses `UUID:major:minor`, the same shape `Display` writes.
impl FromStr for BeaconIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().splitn(3, ':');
        let (Some(uuid), Some(major), Some(minor)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidHardwareId(format!(
                "expected UUID:major:minor, got '{}'",
                s
            )));
        };

        let major = major
            .parse::<u16>()
            .map_err(|e| Error::InvalidHardwareId(format!("bad major '{}': {}", major, e)))?;
        let minor = minor
            .parse::<u16>()
            .map_err(|e| Error::InvalidHardwareId(format!("bad minor '{}': {}", minor, e)))?;

        Self::from_hardware_id(uuid, major, minor)
    }
}

/// Strip dashes and uppercase a hardware id for the catalog wire format
pub fn format_hardware_id(hardware_id: &str) -> String {
    hardware_id.replace('-', "").to_uppercase()
}

/// Parse a hardware id into a UUID
///
/// Accepts the 36-char dashed form (`8-4-4-4-12`) or the 32-char undashed
/// form, in any letter case. Anything else is rejected.
pub fn parse_hardware_id(hardware_id: &str) -> Result<Uuid> {
    let trimmed = hardware_id.trim();
    match trimmed.len() {
        32 | 36 => Uuid::parse_str(trimmed)
            .map_err(|e| Error::InvalidHardwareId(format!("'{}': {}", hardware_id, e))),
        n => Err(Error::InvalidHardwareId(format!(
            "'{}' has {} chars, expected 32 or 36",
            hardware_id, n
        ))),
    }
}

/// Coarse distance bucket reported by the ranging subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proximity {
    Immediate,
    Near,
    Far,
    #[default]
    Unknown,
}

/// One beacon as seen in a single ranging report
///
/// Signal metadata is carried along for display only; nothing filters on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconSighting {
    pub identity: BeaconIdentity,

    /// Received signal strength (dBm), if reported
    #[serde(default)]
    pub rssi: Option<i16>,

    #[serde(default)]
    pub proximity: Proximity,

    /// Estimated distance in meters, if reported
    #[serde(default)]
    pub accuracy_m: Option<f64>,
}

impl BeaconSighting {
    pub fn new(identity: BeaconIdentity) -> Self {
        Self {
            identity,
            rssi: None,
            proximity: Proximity::Unknown,
            accuracy_m: None,
        }
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_proximity(mut self, proximity: Proximity) -> Self {
        self.proximity = proximity;
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }
}

impl From<BeaconIdentity> for BeaconSighting {
    fn from(identity: BeaconIdentity) -> Self {
        Self::new(identity)
    }
}
