//! Queue counters and gauges
//!
//! Gauges are written while the queue lock is held, so a snapshot taken under
//! the same lock matches the queue structure exactly. Readers outside the lock
//! get a best-effort view.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Live metrics for one queue (thread-safe)
#[derive(Debug, Default)]
pub struct QueueMetrics {
    successes: AtomicU64,
    failures: AtomicU64,
    processing_nanos: AtomicU64,
    evictions: AtomicU64,
    pending: AtomicI64,
    purgatory: AtomicI64,
    processing: AtomicI64,
    peak_processing: AtomicI64,
}

/// Point-in-time copy of [`QueueMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetricsSnapshot {
    /// Items processed successfully
    pub successes: u64,
    /// Items that failed with a regular or purgatory error
    pub failures: u64,
    /// Cumulative time spent in successful processing calls
    pub processing_nanos: u64,
    /// Items pushed out by higher-priority arrivals
    pub evictions: u64,
    /// Items waiting in the queue, ready or backing off
    pub pending: i64,
    /// Items quarantined in purgatory
    pub purgatory: i64,
    /// Items currently being processed
    pub processing: i64,
    /// Highest processing count observed
    pub peak_processing: i64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time spent in one processing call, whatever its outcome
    pub fn record_processing(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.processing_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_pending(&self, pending: usize) {
        self.pending.store(pending as i64, Ordering::Relaxed);
    }

    pub fn set_purgatory(&self, purgatory: usize) {
        self.purgatory.store(purgatory as i64, Ordering::Relaxed);
    }

    pub fn set_processing(&self, processing: usize) {
        let processing = processing as i64;
        self.processing.store(processing, Ordering::Relaxed);
        self.peak_processing.fetch_max(processing, Ordering::Relaxed);
    }

    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn purgatory(&self) -> i64 {
        self.purgatory.load(Ordering::Relaxed)
    }

    pub fn processing(&self) -> i64 {
        self.processing.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            processing_nanos: self.processing_nanos.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pending: self.pending(),
            purgatory: self.purgatory(),
            processing: self.processing(),
            peak_processing: self.peak_processing.load(Ordering::Relaxed),
        }
    }
}

impl QueueMetricsSnapshot {
    /// Cumulative processing time
    pub fn processing_time(&self) -> Duration {
        Duration::from_nanos(self.processing_nanos)
    }

    /// Fold another queue's snapshot into this one
    pub fn merge(&mut self, other: &QueueMetricsSnapshot) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.processing_nanos += other.processing_nanos;
        self.evictions += other.evictions;
        self.pending += other.pending;
        self.purgatory += other.purgatory;
        self.processing += other.processing;
        self.peak_processing = self.peak_processing.max(other.peak_processing);
    }
}
