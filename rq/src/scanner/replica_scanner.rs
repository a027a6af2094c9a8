//! Replica scanner implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::ScannerConfig;
use crate::domain::{RangeId, Replica};
use crate::queue::{Queue, QueueError};

/// Anything that can list the replicas currently hosted
pub trait ReplicaSource: Send + Sync {
    fn replicas(&self) -> Vec<Arc<dyn Replica>>;
}

/// Result of a single pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Replicas offered to the queues
    pub visited: usize,
    /// New queue entries created
    pub added: usize,
}

/// Cumulative scanner counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerStats {
    pub scans: u64,
    pub visited: u64,
    pub added: u64,
}

/// The ReplicaScanner feeds every replica to every registered queue, once per
/// interval, and propagates replica removal to all of them.
pub struct ReplicaScanner {
    config: ScannerConfig,
    source: Arc<dyn ReplicaSource>,
    queues: Vec<Arc<dyn Queue>>,
    scans: AtomicU64,
    visited: AtomicU64,
    added: AtomicU64,
}

impl ReplicaScanner {
    pub fn new(config: ScannerConfig, source: Arc<dyn ReplicaSource>, queues: Vec<Arc<dyn Queue>>) -> Self {
        debug!(?config, queues = queues.len(), "ReplicaScanner::new: called");
        Self {
            config,
            source,
            queues,
            scans: AtomicU64::new(0),
            visited: AtomicU64::new(0),
            added: AtomicU64::new(0),
        }
    }

    pub fn queues(&self) -> &[Arc<dyn Queue>] {
        &self.queues
    }

    /// Offer one replica to every queue. Returns the number of queues that
    /// created a new entry for it.
    pub fn add_replica(&self, replica: &Arc<dyn Replica>, now: Instant) -> usize {
        let mut added = 0;
        for queue in &self.queues {
            match queue.maybe_add(Arc::clone(replica), now) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(QueueError::Stopped { name }) => {
                    debug!(queue = %name, range_id = %replica.range_id(), "ReplicaScanner::add_replica: queue stopped");
                }
                Err(err) => {
                    debug!(error = %err, "ReplicaScanner::add_replica: admission failed");
                }
            }
        }
        added
    }

    /// Drop a replica from every queue
    pub fn remove_replica(&self, range_id: RangeId) {
        debug!(%range_id, "ReplicaScanner::remove_replica: called");
        for queue in &self.queues {
            queue.remove(range_id);
        }
    }

    /// Run one full pass over the replica set
    pub fn scan_once(&self, now: Instant) -> ScanReport {
        let replicas = self.source.replicas();
        let mut report = ScanReport {
            visited: replicas.len(),
            added: 0,
        };
        for replica in &replicas {
            report.added += self.add_replica(replica, now);
        }

        self.scans.fetch_add(1, Ordering::Relaxed);
        self.visited.fetch_add(report.visited as u64, Ordering::Relaxed);
        self.added.fetch_add(report.added as u64, Ordering::Relaxed);
        debug!(visited = report.visited, added = report.added, "ReplicaScanner::scan_once: done");
        report
    }

    pub fn stats(&self) -> ScannerStats {
        ScannerStats {
            scans: self.scans.load(Ordering::Relaxed),
            visited: self.visited.load(Ordering::Relaxed),
            added: self.added.load(Ordering::Relaxed),
        }
    }

    /// Run the scan loop
    ///
    /// The first pass runs immediately; the loop exits when `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(interval_ms = self.config.interval_ms, queues = self.queues.len(), "ReplicaScanner started");

        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.scan_once(Instant::now());
                }
            }
        }

        info!(scans = self.scans.load(Ordering::Relaxed), "ReplicaScanner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DestroyReason, LeaseStatus, RangeDescriptor, StoreId, SystemConfig};
    use crate::queue::{Admission, BaseQueue, ProcessError, QueueConfig, QueuePolicy};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed(RangeId);

    impl Replica for Fixed {
        fn range_id(&self) -> RangeId {
            self.0
        }
        fn store_id(&self) -> StoreId {
            StoreId(1)
        }
        fn is_initialized(&self) -> bool {
            true
        }
        fn destroy_status(&self) -> DestroyReason {
            DestroyReason::Alive
        }
        fn desc(&self) -> RangeDescriptor {
            RangeDescriptor::new(self.0, b"a".to_vec(), b"b".to_vec())
        }
        fn lease_status(&self, _now: Instant) -> LeaseStatus {
            LeaseStatus::Unknown
        }
    }

    struct Source(Vec<Arc<dyn Replica>>);

    impl ReplicaSource for Source {
        fn replicas(&self) -> Vec<Arc<dyn Replica>> {
            self.0.clone()
        }
    }

    /// Admits even range ids only
    struct EvenOnly;

    #[async_trait]
    impl QueuePolicy for EvenOnly {
        fn should_queue(&self, _now: Instant, replica: &dyn Replica, _cfg: Option<&SystemConfig>) -> Admission {
            Admission::from_decision(replica.range_id().0 % 2 == 0, 1.0)
        }

        async fn process(&self, _replica: Arc<dyn Replica>, _cfg: Option<Arc<SystemConfig>>) -> Result<(), ProcessError> {
            Ok(())
        }

        fn timer(&self, _attempt: u32) -> Duration {
            Duration::ZERO
        }
    }

    fn scanner(ids: &[i64]) -> (ReplicaScanner, BaseQueue<EvenOnly>) {
        let replicas = ids.iter().map(|id| Arc::new(Fixed(RangeId(*id))) as Arc<dyn Replica>).collect();
        let queue = BaseQueue::new("even", EvenOnly, QueueConfig::default()).unwrap();
        let scanner = ReplicaScanner::new(
            ScannerConfig::default(),
            Arc::new(Source(replicas)),
            vec![Arc::new(queue.clone()) as Arc<dyn Queue>],
        );
        (scanner, queue)
    }

    #[test]
    fn test_scan_once() {
        let (scanner, queue) = scanner(&[1, 2, 3, 4]);
        let report = scanner.scan_once(Instant::now());
        assert_eq!(report, ScanReport { visited: 4, added: 2 });
        assert_eq!(queue.len(), 2);

        // A second pass finds everything already queued
        let report = scanner.scan_once(Instant::now());
        assert_eq!(report.added, 0);
        assert_eq!(scanner.stats().scans, 2);
        assert_eq!(scanner.stats().visited, 8);
    }

    #[test]
    fn test_remove_replica() {
        let (scanner, queue) = scanner(&[2]);
        scanner.scan_once(Instant::now());
        scanner.remove_replica(RangeId(2));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_stopped_queue_is_ignored() {
        let (scanner, queue) = scanner(&[2, 4]);
        queue.stop().await;
        let report = scanner.scan_once(Instant::now());
        assert_eq!(report, ScanReport { visited: 2, added: 0 });
    }

    #[tokio::test]
    async fn test_run_scans_until_cancelled() {
        let (scanner, queue) = scanner(&[2, 4, 6]);
        let scanner = Arc::new(scanner);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&scanner).run(cancel.clone()));

        let scanned = tokio::time::timeout(Duration::from_secs(5), async {
            while scanner.stats().scans == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
        assert!(scanned.is_ok());
        assert_eq!(queue.len(), 3);

        cancel.cancel();
        task.await.unwrap();
    }
}
