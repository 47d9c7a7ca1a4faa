use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::errors::{ClusterError, Result};

/// Cluster configuration with all tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Divisors whose magnitude is at or below this value raise an arithmetic fault.
    /// Zero faults only on an exact zero; non-finite divisors always fault.
    pub pivot_tolerance: f64,
    /// Concurrent inbound reads each in-memory datastore admits (0 = matrix size)
    pub max_pending_requests: usize,
    /// Simulated network latency applied to every in-memory datastore read
    pub read_latency: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            pivot_tolerance: 0.0,
            max_pending_requests: 0,
            read_latency: Duration::ZERO,
        }
    }
}

impl ClusterConfig {
    /// Create a new builder for ClusterConfig
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.pivot_tolerance.is_finite() || self.pivot_tolerance < 0.0 {
            return Err(ClusterError::configuration_field(
                "pivot_tolerance must be a finite, non-negative number",
                "pivot_tolerance",
            ));
        }
        if self.read_latency > Duration::from_secs(1) {
            return Err(ClusterError::configuration_field(
                "read_latency cannot exceed one second",
                "read_latency",
            ));
        }
        Ok(())
    }

    /// Tight capacity and no latency, for fast tests
    pub fn development() -> Self {
        Self {
            max_pending_requests: 1,
            ..Default::default()
        }
    }

    /// Small capacity and a read delay so that remote reads overlap
    pub fn simulated_network() -> Self {
        Self {
            max_pending_requests: 2,
            read_latency: Duration::from_millis(1),
            ..Default::default()
        }
    }
}

/// Builder for ClusterConfig
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: ClusterConfig::default(),
        }
    }

    pub fn pivot_tolerance(mut self, tolerance: f64) -> Self {
        self.config.pivot_tolerance = tolerance;
        self
    }

    pub fn max_pending_requests(mut self, bound: usize) -> Self {
        self.config.max_pending_requests = bound;
        self
    }

    pub fn read_latency(mut self, latency: Duration) -> Self {
        self.config.read_latency = latency;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ClusterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ClusterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClusterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_pending_requests, 0);
    }

    #[test]
    fn test_presets() {
        assert!(ClusterConfig::development().validate().is_ok());
        let network = ClusterConfig::simulated_network();
        assert!(network.validate().is_ok());
        assert_eq!(network.max_pending_requests, 2);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = ClusterConfig::default();

        config.pivot_tolerance = -1.0;
        assert!(config.validate().is_err());
        config.pivot_tolerance = f64::NAN;
        assert!(config.validate().is_err());
        config.pivot_tolerance = 0.0;
        assert!(config.validate().is_ok());

        config.read_latency = Duration::from_secs(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = ClusterConfig::builder()
            .pivot_tolerance(1e-9)
            .max_pending_requests(3)
            .read_latency(Duration::from_millis(2))
            .build()
            .unwrap();

        assert_eq!(config.pivot_tolerance, 1e-9);
        assert_eq!(config.max_pending_requests, 3);
        assert_eq!(config.read_latency, Duration::from_millis(2));

        assert!(ClusterConfig::builder().pivot_tolerance(-1.0).build().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: ClusterConfig = serde_yaml::from_str("max_pending_requests: 4").unwrap();
        assert_eq!(config.max_pending_requests, 4);
        assert_eq!(config.pivot_tolerance, 0.0);
        assert_eq!(config.read_latency, Duration::ZERO);
    }
}
