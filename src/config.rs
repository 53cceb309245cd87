//! Monitoring configuration for the Exam Proctoring Agent
//!
//! All thresholds and cadences carried by the session controller. Defaults
//! match the reference monitoring profile: face sampling every 2s, loudness
//! every 500ms, noise threshold 24, warning limit 10, loudness debounce 1s.

use serde::{Deserialize, Serialize};

use crate::error::{ProctorError, Result};

/// Tunable monitoring parameters for one exam session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Face-sampling period in milliseconds.
    pub face_interval_ms: u64,

    /// Loudness-sampling period in milliseconds.
    pub loudness_interval_ms: u64,

    /// Loudness above this value is a violation. Oracle range is [0, 255].
    pub noise_threshold: f64,

    /// Warning count at which the termination policy fires.
    pub warning_limit: u32,

    /// Minimum gap between two loud-noise records. A continuous noise event
    /// produces one record per window, not one per sample.
    pub debounce_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            face_interval_ms: 2000,
            loudness_interval_ms: 500,
            noise_threshold: 24.0,
            warning_limit: 10,
            debounce_ms: 1000,
        }
    }
}

impl MonitoringConfig {
    /// Create a new config builder
    pub fn builder() -> MonitoringConfigBuilder {
        MonitoringConfigBuilder::new()
    }

    /// Create config from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            face_interval_ms: std::env::var("PROCTOR_FACE_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.face_interval_ms),
            loudness_interval_ms: std::env::var("PROCTOR_LOUDNESS_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.loudness_interval_ms),
            noise_threshold: std::env::var("PROCTOR_NOISE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.noise_threshold),
            warning_limit: std::env::var("PROCTOR_WARNING_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.warning_limit),
            debounce_ms: std::env::var("PROCTOR_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.debounce_ms),
        }
    }

    /// Validate the configuration. Zero-period detectors and a zero warning
    /// limit are rejected as contract violations.
    pub fn validate(&self) -> Result<()> {
        if self.face_interval_ms == 0 {
            return Err(ProctorError::config("face_interval_ms must be non-zero"));
        }
        if self.loudness_interval_ms == 0 {
            return Err(ProctorError::config(
                "loudness_interval_ms must be non-zero",
            ));
        }
        if self.warning_limit == 0 {
            return Err(ProctorError::config("warning_limit must be non-zero"));
        }
        if !(0.0..=255.0).contains(&self.noise_threshold) {
            return Err(ProctorError::config(
                "noise_threshold must be within [0, 255]",
            ));
        }
        Ok(())
    }
}

/// Builder for MonitoringConfig
pub struct MonitoringConfigBuilder {
    config: MonitoringConfig,
}

impl MonitoringConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: MonitoringConfig::default(),
        }
    }

    /// Set the face-sampling period in milliseconds
    pub fn face_interval_ms(mut self, ms: u64) -> Self {
        self.config.face_interval_ms = ms;
        self
    }

    /// Set the loudness-sampling period in milliseconds
    pub fn loudness_interval_ms(mut self, ms: u64) -> Self {
        self.config.loudness_interval_ms = ms;
        self
    }

    /// Set the loudness violation threshold
    pub fn noise_threshold(mut self, threshold: f64) -> Self {
        self.config.noise_threshold = threshold;
        self
    }

    /// Set the warning count at which the session terminates
    pub fn warning_limit(mut self, limit: u32) -> Self {
        self.config.warning_limit = limit;
        self
    }

    /// Set the loud-noise debounce window in milliseconds
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.debounce_ms = ms;
        self
    }

    /// Build the configuration
    pub fn build(self) -> MonitoringConfig {
        self.config
    }
}

impl Default for MonitoringConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitoringConfig::default();
        assert_eq!(config.face_interval_ms, 2000);
        assert_eq!(config.loudness_interval_ms, 500);
        assert_eq!(config.noise_threshold, 24.0);
        assert_eq!(config.warning_limit, 10);
        assert_eq!(config.debounce_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = MonitoringConfig::builder()
            .face_interval_ms(1000)
            .loudness_interval_ms(250)
            .noise_threshold(40.0)
            .warning_limit(5)
            .debounce_ms(2000)
            .build();

        assert_eq!(config.face_interval_ms, 1000);
        assert_eq!(config.loudness_interval_ms, 250);
        assert_eq!(config.noise_threshold, 40.0);
        assert_eq!(config.warning_limit, 5);
        assert_eq!(config.debounce_ms, 2000);
    }

    #[test]
    fn test_validation_rejects_zero_periods() {
        let config = MonitoringConfig::builder().face_interval_ms(0).build();
        assert!(config.validate().is_err());

        let config = MonitoringConfig::builder().loudness_interval_ms(0).build();
        assert!(config.validate().is_err());

        let config = MonitoringConfig::builder().warning_limit(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_threshold() {
        let config = MonitoringConfig::builder().noise_threshold(300.0).build();
        assert!(config.validate().is_err());

        let config = MonitoringConfig::builder().noise_threshold(-1.0).build();
        assert!(config.validate().is_err());
    }
}
