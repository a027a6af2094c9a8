//! Self-contained store simulation used by `rq simulate`
//!
//! Builds a store of synthetic replicas served by one queue with a
//! fault-injecting policy, churns ranges in and out while the workers run,
//! checks invariants every tick and reports the final queue metrics.

mod config;
mod policy;
mod replica;

use std::sync::Arc;
use std::time::Instant;

use eyre::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{RangeId, StoreId};
use crate::queue::{BaseQueue, Queue, QueueConfig, QueueMetricsSnapshot};
use crate::scanner::ScannerConfig;
use crate::store::Store;

pub use config::{OutcomeWeights, SimulationConfig};
pub use policy::{FaultPolicy, Outcome};
pub use replica::SimReplica;

const SIM_STORE: StoreId = StoreId(1);

/// Summary of a simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationReport {
    pub ranges_added: u64,
    pub ranges_removed: u64,
    pub ticks: u64,
    pub invariant_violations: u64,
    /// Processing calls made by the policy
    pub process_calls: u64,
    /// Replicas hosted when the run ended
    pub replicas: usize,
    pub elapsed_ms: u64,
    /// Queue metrics taken just before stopping
    pub metrics: QueueMetricsSnapshot,
}

/// Run a store with one fault-injected queue for `simulation.duration()`
pub async fn run_simulation(
    queue_config: QueueConfig,
    scanner_config: ScannerConfig,
    simulation: SimulationConfig,
) -> Result<SimulationReport> {
    info!(ranges = simulation.ranges, duration_secs = simulation.duration_secs, "Simulation starting");
    let started = Instant::now();

    let queue = BaseQueue::new("sim", FaultPolicy::new(simulation.clone()), queue_config)
        .context("Failed to create simulation queue")?;
    let store = Store::new(SIM_STORE, scanner_config, vec![Arc::new(queue.clone()) as Arc<dyn Queue>]);

    let mut next_id: i64 = 1;
    let mut ranges_added = 0u64;
    let mut ranges_removed = 0u64;
    for _ in 0..simulation.ranges {
        store.add_replica(Arc::new(SimReplica::new(RangeId(next_id), SIM_STORE)));
        next_id += 1;
        ranges_added += 1;
    }

    store.start().context("Failed to start store")?;

    let deadline = started + simulation.duration();
    let mut interval = tokio::time::interval(simulation.tick());
    let mut ticks = 0u64;
    let mut invariant_violations = 0u64;

    while Instant::now() < deadline {
        interval.tick().await;
        ticks += 1;

        let victims: Vec<RangeId> = {
            let mut rng = rand::rng();
            (0..simulation.churn_per_tick)
                .map(|_| RangeId(rng.random_range(1..next_id.max(2))))
                .collect()
        };
        for range_id in victims {
            if store.remove_replica(range_id).is_some() {
                ranges_removed += 1;
            }
        }
        for _ in 0..simulation.churn_per_tick {
            store.add_replica(Arc::new(SimReplica::new(RangeId(next_id), SIM_STORE)));
            next_id += 1;
            ranges_added += 1;
        }

        if let Err(violation) = store.check_invariants() {
            warn!(%violation, tick = ticks, "Invariant violated");
            invariant_violations += 1;
        }
    }

    let metrics = queue.metrics();
    let replicas = store.replica_count();
    store.stop().await;

    let report = SimulationReport {
        ranges_added,
        ranges_removed,
        ticks,
        invariant_violations,
        process_calls: queue.policy().calls(),
        replicas,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        metrics,
    };
    info!(
        ticks = report.ticks,
        successes = report.metrics.successes,
        failures = report.metrics.failures,
        violations = report.invariant_violations,
        "Simulation finished"
    );
    Ok(report)
}
