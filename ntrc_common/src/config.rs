//! Configuration loading traits and types.
//!
//! Every ntrc front end reads its settings from a single TOML file. The
//! [`ConfigLoader`] trait gives any `Deserialize` struct a `load()` method,
//! plus `load_if_exists()` for the optional well-known config path.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ntrc_common::config::{ConfigError, ConfigLoader, SharedConfig};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct FrontEndConfig {
//!     shared: SharedConfig,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = FrontEndConfig::load(Path::new("ntrc.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, per-register tracing.
    Trace,
    /// Per-iteration stabilization detail.
    Debug,
    /// Lifecycle transitions.
    #[default]
    Info,
    /// Retries and rejected requests.
    Warn,
    /// Fatal failures only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across ntrc front ends.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "ntrc-sim-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier used in log output.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: crate::consts::HANDLER_NAME.to_string(),
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid or the file
///   cannot be read
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from an optional TOML file.
    ///
    /// A missing file yields `Ok(None)` so callers can fall back to
    /// defaults; a file that exists but cannot be read or parsed is an error.
    fn load_if_exists(path: &Path) -> Result<Option<Self>, ConfigError> {
        match Self::load(path) {
            Ok(config) => Ok(Some(config)),
            Err(ConfigError::FileNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// Any serde-deserializable struct gets `load()`.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
