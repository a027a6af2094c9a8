//! Simulation configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Relative weights of processing outcomes drawn by the fault-injecting policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutcomeWeights {
    pub success: u32,
    pub regular: u32,
    pub benign: u32,
    pub purgatory: u32,
}

impl Default for OutcomeWeights {
    fn default() -> Self {
        Self {
            success: 1,
            regular: 1,
            benign: 1,
            purgatory: 1,
        }
    }
}

impl OutcomeWeights {
    pub fn total(&self) -> u64 {
        u64::from(self.success) + u64::from(self.regular) + u64::from(self.benign) + u64::from(self.purgatory)
    }
}

/// Configuration for `rq simulate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationConfig {
    /// Ranges hosted at startup
    #[serde(default = "default_ranges")]
    pub ranges: usize,

    /// How long the store runs before stopping
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Chance that the policy admits a candidate
    #[serde(default = "default_admit_probability")]
    pub admit_probability: f64,

    /// Admitted priorities are drawn uniformly from `0..priority-spread`
    #[serde(default = "default_priority_spread")]
    pub priority_spread: f64,

    /// Simulated work per processing call
    #[serde(default = "default_process_latency_ms")]
    pub process_latency_ms: u64,

    #[serde(default)]
    pub outcomes: OutcomeWeights,

    /// Period of the purgatory wake signal
    #[serde(default = "default_purgatory_interval_ms")]
    pub purgatory_interval_ms: u64,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Ranges removed and created on every tick
    #[serde(default = "default_churn_per_tick")]
    pub churn_per_tick: usize,

    /// Period of churn and invariant checks
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_ranges() -> usize {
    1000
}

fn default_duration_secs() -> u64 {
    5
}

fn default_admit_probability() -> f64 {
    0.8
}

fn default_priority_spread() -> f64 {
    10.0
}

fn default_process_latency_ms() -> u64 {
    1
}

fn default_purgatory_interval_ms() -> u64 {
    100
}

fn default_backoff_base_ms() -> u64 {
    10
}

fn default_backoff_max_ms() -> u64 {
    1000
}

fn default_churn_per_tick() -> usize {
    5
}

fn default_tick_ms() -> u64 {
    50
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ranges: default_ranges(),
            duration_secs: default_duration_secs(),
            admit_probability: default_admit_probability(),
            priority_spread: default_priority_spread(),
            process_latency_ms: default_process_latency_ms(),
            outcomes: OutcomeWeights::default(),
            purgatory_interval_ms: default_purgatory_interval_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            churn_per_tick: default_churn_per_tick(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl SimulationConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn process_latency(&self) -> Duration {
        Duration::from_millis(self.process_latency_ms)
    }

    pub fn purgatory_interval(&self) -> Duration {
        Duration::from_millis(self.purgatory_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Churn period. Never zero.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.ranges, 1000);
        assert_eq!(config.duration(), Duration::from_secs(5));
        assert_eq!(config.outcomes.total(), 4);
        assert_eq!(config.tick(), Duration::from_millis(50));
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = "ranges: 10\noutcomes:\n  purgatory: 0\n";
        let config: SimulationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ranges, 10);
        assert_eq!(config.outcomes.purgatory, 0);
        assert_eq!(config.outcomes.success, 1);
        assert_eq!(config.duration_secs, 5);
    }
}
