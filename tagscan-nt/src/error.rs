//! Error types for tagscan-nt
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Catalog lookup failures have their own type ([`crate::resolver::ResolveError`])
//! because the engine absorbs them during batch reconciliation; only manual
//! inserts surface them through [`Error::Resolve`].

use thiserror::Error;

use crate::resolver::ResolveError;

/// Main error type for tagscan-nt
#[derive(Error, Debug)]
pub enum Error {
    /// Shared crate errors (config, hardware id parsing)
    #[error(transparent)]
    Common(#[from] tagscan_common::Error),

    /// Scenario file could not be read or is inconsistent
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// Scenario TOML parse errors
    #[error("Scenario parse error: {0}")]
    ScenarioParse(#[from] toml::de::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Region registry is at its platform limit
    #[error("Region limit reached: {0}")]
    RegionLimit(String),

    /// Manual insert could not resolve the beacon
    #[error("Lookup failed: {0}")]
    Resolve(#[from] ResolveError),

    /// Manager no longer accepts input
    #[error("Nearby tag manager is shut down")]
    ShutDown,
}

/// Convenience Result type using tagscan-nt Error
pub type Result<T> = std::result::Result<T, Error>;
