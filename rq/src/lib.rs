//! rangequeue - background range maintenance queue
//!
//! A storage node hosts many ranges and must keep deciding, for each one,
//! whether a maintenance operation (split, merge, GC, replicate, ...) should
//! run and when. This crate provides the scheduler that makes that decision
//! under bounded capacity and bounded concurrency.
//!
//! # Core Concepts
//!
//! - **Admission**: a [`QueuePolicy`] decides whether a replica is queued and at what priority
//! - **Priority order**: higher priority first, arrival order among equals
//! - **Bounded**: `max-size` items held, `max-concurrency` processed at once
//! - **Failure routing**: regular errors back off and retry, benign errors drop,
//!   purgatory errors quarantine until the policy's wake signal
//!
//! # Modules
//!
//! - [`domain`] - Range identifiers, the [`Replica`] trait and the system config feed
//! - [`queue`] - The queue core, its policy trait, errors and metrics
//! - [`scanner`] - Periodic driver feeding replicas to queues
//! - [`store`] - Owner of replicas, queues and scanner
//! - [`sim`] - Synthetic replicas and a fault-injecting policy
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod queue;
pub mod scanner;
pub mod sim;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use domain::{
    DestroyReason, LeaseStatus, RangeDescriptor, RangeId, Replica, StoreId, SystemConfig, SystemConfigReceiver,
    SystemConfigSender, system_config_channel,
};
pub use queue::{
    Admission, BaseQueue, ErrorClass, InvariantViolation, ItemStatus, ProcessError, Queue, QueueConfig, QueueError,
    QueueMetrics, QueueMetricsSnapshot, QueuePolicy, exponential_backoff,
};
pub use scanner::{ReplicaScanner, ReplicaSource, ScanReport, ScannerConfig};
pub use sim::{FaultPolicy, SimReplica, SimulationConfig, SimulationReport, run_simulation};
pub use store::{ReplicaMap, Store};
