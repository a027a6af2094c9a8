//! Background replica-processing queue
//!
//! A [`BaseQueue`] decides through its [`QueuePolicy`] which replicas need a
//! maintenance operation, keeps them in a bounded priority order, and runs
//! them on a fixed-size worker pool. Failures are retried after a backoff,
//! dropped, or quarantined in purgatory until the policy's wake signal.

mod config;
mod core;
mod error;
mod index;
mod metrics;
mod policy;
mod state;

pub use self::core::{BaseQueue, Queue};
pub use config::QueueConfig;
pub use error::{ErrorClass, InvariantViolation, ProcessError, QueueError};
pub use metrics::{QueueMetrics, QueueMetricsSnapshot};
pub use policy::{Admission, DEFAULT_PURGATORY_INTERVAL, QueuePolicy, exponential_backoff};
pub use state::ItemStatus;
