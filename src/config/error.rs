//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Port value is outside valid range (1-65535).
    #[error("invalid port '{value}': must be between 1 and 65535")]
    InvalidPort {
        /// Offending raw value.
        value: String,
    },

    /// Port string could not be parsed as a number.
    #[error("failed to parse port '{value}': {source}")]
    PortParseError {
        /// Offending raw value.
        value: String,
        /// Parse failure.
        #[source]
        source: std::num::ParseIntError,
    },

    /// Bind address string could not be parsed.
    #[error("failed to parse bind address '{value}': {source}")]
    InvalidBindAddr {
        /// Offending raw value.
        value: String,
        /// Parse failure.
        #[source]
        source: std::net::AddrParseError,
    },

    /// A numeric option could not be parsed.
    #[error("failed to parse {name}='{value}' as a number")]
    InvalidNumber {
        /// Option name.
        name: &'static str,
        /// Offending raw value.
        value: String,
    },

    /// A map-valued option (`key=value,key=value`) could not be parsed.
    #[error("failed to parse {name}: bad entry '{entry}'")]
    InvalidMapEntry {
        /// Option name.
        name: &'static str,
        /// Offending entry.
        entry: String,
    },

    /// A threshold option was outside [0, 1].
    #[error("{name} must be within [0.0, 1.0], got {value}")]
    OutOfRange {
        /// Option name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// A configured path exists but is not a directory.
    #[error("path is not a directory: {path}")]
    NotADirectory {
        /// Offending path.
        path: PathBuf,
    },

    /// A configured path does not exist.
    #[error("path not found: {path}")]
    PathNotFound {
        /// Offending path.
        path: PathBuf,
    },
}
