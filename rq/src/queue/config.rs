//! Queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::QueueError;

/// Per-queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Max items held in the queue (ready plus backing off)
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// Number of worker loops, i.e. max items processed at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Upper bound for a single processing call in milliseconds
    #[serde(default = "default_process_timeout_ms")]
    pub process_timeout_ms: u64,

    /// Only process replicas holding a valid lease on their store
    #[serde(default)]
    pub needs_lease: bool,

    /// Skip replicas until a system config has been observed
    #[serde(default)]
    pub needs_system_config: bool,

    /// Admit ranges that the system config says must be split first
    #[serde(default)]
    pub accepts_unsplit_ranges: bool,
}

fn default_max_size() -> usize {
    10_000
}

fn default_max_concurrency() -> usize {
    1
}

fn default_process_timeout_ms() -> u64 {
    60_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_concurrency: default_max_concurrency(),
            process_timeout_ms: default_process_timeout_ms(),
            needs_lease: false,
            needs_system_config: false,
            accepts_unsplit_ranges: false,
        }
    }
}

impl QueueConfig {
    /// Get the process timeout as a Duration
    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }

    /// Reject configurations that would leave the queue unable to make progress
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.max_size == 0 {
            return Err(QueueError::InvalidConfig("max-size must be at least 1".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(QueueError::InvalidConfig(
                "max-concurrency must be at least 1".to_string(),
            ));
        }
        if self.process_timeout_ms == 0 {
            return Err(QueueError::InvalidConfig(
                "process-timeout-ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_size, 10_000);
        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.process_timeout(), Duration::from_secs(60));
        assert!(!config.needs_lease);
        assert!(!config.accepts_unsplit_ranges);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = QueueConfig {
            max_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));

        let config = QueueConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = QueueConfig {
            process_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let config: QueueConfig = serde_yaml::from_str("max-concurrency: 4\nneeds-lease: true\n").unwrap();
        assert_eq!(config.max_concurrency, 4);
        assert!(config.needs_lease);
        assert_eq!(config.max_size, 10_000);
    }
}
