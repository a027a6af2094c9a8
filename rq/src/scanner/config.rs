//! Scanner configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the ReplicaScanner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScannerConfig {
    /// Time between full passes over the replica set, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    600_000
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

impl ScannerConfig {
    /// Get the scan interval as a Duration. Never zero.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}
