//! Tracer timing configuration.

use crate::config::ConfigError;
use crate::consts::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_SETTLE_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default function for poll_interval_ms
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Default function for settle_interval_ms
fn default_settle_interval_ms() -> u64 {
    DEFAULT_SETTLE_INTERVAL_MS
}

/// Worker and stabilization timing, loaded from the `[tracer]` table.
///
/// ```toml
/// [tracer]
/// poll_interval_ms = 50
/// settle_interval_ms = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Interval between worker polls of the state store.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Sleep after re-pausing the pusher before re-reading DMA addresses.
    /// Zero disables the sleep.
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,
}

impl TracerConfig {
    /// Validate the tracer configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `poll_interval_ms` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker polling interval.
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Stabilization settle interval.
    #[inline]
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            settle_interval_ms: DEFAULT_SETTLE_INTERVAL_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: TracerConfig = toml::from_str("").unwrap();
        assert_eq!(config, TracerConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.settle_interval(), Duration::from_millis(10));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let config = TracerConfig {
            poll_interval_ms: 0,
            settle_interval_ms: 0,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let config = TracerConfig {
            poll_interval_ms: 1,
            settle_interval_ms: 0,
        };
        assert!(config.validate().is_ok());
    }
}
