//! Configuration loading
//!
//! Settings resolve in priority order:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is not an error: the loader warns and continues with
//! defaults. A config file that exists but does not parse is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG_PATH: &str = "TAGSCAN_CONFIG";
/// Environment override for [`EngineConfig::show_unassigned`]
pub const ENV_SHOW_UNASSIGNED: &str = "TAGSCAN_SHOW_UNASSIGNED";
/// Environment override for [`EngineConfig::lookup_timeout_ms`]
pub const ENV_LOOKUP_TIMEOUT_MS: &str = "TAGSCAN_LOOKUP_TIMEOUT_MS";

/// Platform limit on the number of monitored proximity UUIDs
pub const DEFAULT_MAX_MONITORED_REGIONS: usize = 20;

/// Engine configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Whether placeholders for unmatched beacons are created and shown
    #[serde(default)]
    pub show_unassigned: bool,

    /// EventBus channel capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Give up on a catalog lookup after this many milliseconds
    ///
    /// Unset means lookups may stay in flight indefinitely.
    #[serde(default)]
    pub lookup_timeout_ms: Option<u64>,

    /// Maximum number of proximity UUIDs monitored at once
    #[serde(default = "default_max_monitored_regions")]
    pub max_monitored_regions: usize,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_event_bus_capacity() -> usize {
    100
}

fn default_max_monitored_regions() -> usize {
    DEFAULT_MAX_MONITORED_REGIONS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            show_unassigned: false,
            event_bus_capacity: default_event_bus_capacity(),
            lookup_timeout_ms: None,
            max_monitored_regions: default_max_monitored_regions(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve the effective config: explicit file > `TAGSCAN_CONFIG` > default
    /// location > compiled defaults, then apply environment overrides.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_file_path(cli_path) {
            Some(path) if path.exists() => {
                debug!("Loading config from {}", path.display());
                Self::load_file(&path)?
            }
            Some(path) => {
                if cli_path.is_some() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                warn!("No config file at {}, using defaults", path.display());
                Self::default()
            }
            None => {
                warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `TAGSCAN_*` environment overrides on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(ENV_SHOW_UNASSIGNED) {
            self.show_unassigned = parse_bool(&value).ok_or_else(|| {
                Error::Config(format!("{} must be true/false, got '{}'", ENV_SHOW_UNASSIGNED, value))
            })?;
        }

        if let Ok(value) = std::env::var(ENV_LOOKUP_TIMEOUT_MS) {
            let ms = value.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("{} must be milliseconds: {}", ENV_LOOKUP_TIMEOUT_MS, e))
            })?;
            self.lookup_timeout_ms = Some(ms);
        }

        self.validate()
    }

    /// Lookup timeout as a Duration
    pub fn lookup_timeout(&self) -> Option<Duration> {
        self.lookup_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be > 0".to_string()));
        }
        if self.max_monitored_regions == 0 {
            return Err(Error::Config("max_monitored_regions must be > 0".to_string()));
        }
        if self.lookup_timeout_ms == Some(0) {
            return Err(Error::Config("lookup_timeout_ms must be > 0 when set".to_string()));
        }
        Ok(())
    }
}

/// Pick the config file path without touching the filesystem
fn config_file_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        return Some(PathBuf::from(path));
    }

    default_config_path()
}

/// Platform config location: `<config_dir>/tagscan/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tagscan").join("config.toml"))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
