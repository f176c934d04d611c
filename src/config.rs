//! Engine configuration
//!
//! Pool bounds and timing windows for runner lifecycle management.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, RunaError};

/// Configuration for an [`Engine`](crate::Engine)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Runners kept alive when idle (eagerly spawned at startup)
    pub pool_min: usize,
    /// Hard ceiling on concurrently owned runners
    pub pool_max: usize,
    /// Capacity of each runner's response pipe. Progress messages are
    /// dropped when the pipe is full; terminal messages never are.
    pub response_capacity: usize,
    /// How long a spawned runner may take to signal ready (ms)
    pub ready_timeout_ms: u64,
    /// How long an aborted runner may take to acknowledge before it is
    /// forcibly retired and replaced (ms)
    pub abort_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_min: 1,
            pool_max: 4,
            response_capacity: 32,
            ready_timeout_ms: 2_000,
            abort_grace_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Check bound and window sanity
    pub fn validate(&self) -> Result<()> {
        if self.pool_min == 0 || self.pool_min > self.pool_max {
            return Err(RunaError::InvalidPoolBounds {
                min: self.pool_min,
                max: self.pool_max,
            });
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn abort_grace(&self) -> Duration {
        Duration::from_millis(self.abort_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_min_is_rejected() {
        let config = EngineConfig {
            pool_min: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            RunaError::InvalidPoolBounds { .. }
        ));
    }

    #[test]
    fn min_above_max_is_rejected() {
        let config = EngineConfig {
            pool_min: 8,
            pool_max: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{ "pool_max": 8 }"#).unwrap();
        assert_eq!(config.pool_max, 8);
        assert_eq!(config.pool_min, 1);
    }
}
