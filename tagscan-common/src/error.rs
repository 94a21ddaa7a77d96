//! Common error types for tagscan

use thiserror::Error;

/// Common result type for tagscan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across tagscan crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error (wraps toml::de::Error)
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hardware id or beacon triple could not be parsed
    #[error("Invalid hardware id: {0}")]
    InvalidHardwareId(String),
}
