//! Queue error types

use std::time::Duration;

use thiserror::Error;

use crate::domain::RangeId;

/// Errors surfaced synchronously by the queue API
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue {name} is stopped")]
    Stopped { name: String },

    #[error("queue {name} is already started")]
    AlreadyStarted { name: String },

    #[error("Invalid queue config: {0}")]
    InvalidConfig(String),
}

/// How the queue reacts to a failed processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the item after the policy's backoff delay
    Regular,
    /// Drop the item without retrying
    Benign,
    /// Quarantine the item until the purgatory wake signal fires
    Purgatory,
}

/// Errors returned by a queue policy's `process`. They never reach callers of
/// the admission API; the queue absorbs them into item state and metrics.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{0}")]
    Regular(eyre::Report),

    #[error("benign: {0}")]
    Benign(eyre::Report),

    #[error("purgatory: {0}")]
    Purgatory(eyre::Report),

    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),
}

impl ProcessError {
    pub fn regular<M>(msg: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Regular(eyre::Report::msg(msg))
    }

    pub fn benign<M>(msg: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Benign(eyre::Report::msg(msg))
    }

    pub fn purgatory<M>(msg: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Purgatory(eyre::Report::msg(msg))
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Regular(_) | Self::Timeout(_) => ErrorClass::Regular,
            Self::Benign(_) => ErrorClass::Benign,
            Self::Purgatory(_) => ErrorClass::Purgatory,
        }
    }
}

impl From<eyre::Report> for ProcessError {
    fn from(report: eyre::Report) -> Self {
        Self::Regular(report)
    }
}

/// Structural fault found by the invariant checker
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvariantViolation {
    #[error("{0} is both queued and in purgatory")]
    QueuedAndInPurgatory(RangeId),

    #[error("{0} is processing but still queued")]
    ProcessingButQueued(RangeId),

    #[error("queue holds {len} items, max is {max}")]
    Oversized { len: usize, max: usize },

    #[error("{processing} items processing, max concurrency is {max}")]
    TooManyProcessing { processing: usize, max: usize },

    #[error("priority index and id index disagree")]
    IndexInconsistent,

    #[error("{range_id} state mismatch: {detail}")]
    StateMismatch { range_id: RangeId, detail: String },

    #[error("gauge {gauge} reads {actual}, expected {expected}")]
    GaugeMismatch {
        gauge: &'static str,
        expected: i64,
        actual: i64,
    },
}
