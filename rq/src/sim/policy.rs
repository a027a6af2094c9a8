//! Fault-injecting queue policy

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::SimulationConfig;
use crate::domain::{Replica, SystemConfig};
use crate::queue::{Admission, ProcessError, QueuePolicy, exponential_backoff};

/// One drawn processing result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    Success,
    Regular,
    Benign,
    Purgatory,
}

/// Admits a random share of candidates at random priorities and fails
/// processing calls according to the configured outcome weights
pub struct FaultPolicy {
    config: SimulationConfig,
    calls: AtomicU64,
}

impl FaultPolicy {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            calls: AtomicU64::new(0),
        }
    }

    /// Processing calls started so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn draw_outcome(&self) -> Outcome {
        let weights = &self.config.outcomes;
        let total = weights.total();
        if total == 0 {
            return Outcome::Success;
        }
        let mut roll = rand::rng().random_range(0..total);
        for (weight, outcome) in [
            (weights.success, Outcome::Success),
            (weights.regular, Outcome::Regular),
            (weights.benign, Outcome::Benign),
            (weights.purgatory, Outcome::Purgatory),
        ] {
            let weight = u64::from(weight);
            if roll < weight {
                return outcome;
            }
            roll -= weight;
        }
        Outcome::Success
    }
}

#[async_trait]
impl QueuePolicy for FaultPolicy {
    fn should_queue(&self, _now: Instant, _replica: &dyn Replica, _system_config: Option<&SystemConfig>) -> Admission {
        let mut rng = rand::rng();
        let probability = self.config.admit_probability;
        let admit = !probability.is_nan() && rng.random_bool(probability.clamp(0.0, 1.0));
        let spread = self.config.priority_spread;
        let priority = if spread.is_finite() && spread > 0.0 {
            rng.random_range(0.0..spread)
        } else {
            0.0
        };
        Admission::from_decision(admit, priority)
    }

    async fn process(
        &self,
        replica: Arc<dyn Replica>,
        _system_config: Option<Arc<SystemConfig>>,
    ) -> Result<(), ProcessError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let outcome = self.draw_outcome();
        let latency = self.config.process_latency();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }

        let range_id = replica.range_id();
        match outcome {
            Outcome::Success => Ok(()),
            Outcome::Regular => Err(ProcessError::regular(format!("injected failure on {range_id}"))),
            Outcome::Benign => Err(ProcessError::benign(format!("{range_id} no longer needs work"))),
            Outcome::Purgatory => Err(ProcessError::purgatory(format!("no target for {range_id}"))),
        }
    }

    fn timer(&self, attempt: u32) -> Duration {
        exponential_backoff(self.config.backoff_base(), self.config.backoff_max(), attempt)
    }

    async fn purgatory_wake(&self) {
        tokio::time::sleep(self.config.purgatory_interval()).await;
    }
}
