//! Store: owner of the replica set, its queues and the scanner

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{RangeId, Replica, StoreId};
use crate::queue::{InvariantViolation, Queue, QueueError, QueueMetricsSnapshot};
use crate::scanner::{ReplicaScanner, ReplicaSource, ScannerConfig};

/// Replicas hosted by a store, keyed by range id
#[derive(Default)]
pub struct ReplicaMap {
    replicas: RwLock<BTreeMap<RangeId, Arc<dyn Replica>>>,
}

impl ReplicaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a replica, returning the one it replaced
    pub fn insert(&self, replica: Arc<dyn Replica>) -> Option<Arc<dyn Replica>> {
        let mut replicas = self.replicas.write().unwrap_or_else(PoisonError::into_inner);
        replicas.insert(replica.range_id(), replica)
    }

    pub fn remove(&self, range_id: RangeId) -> Option<Arc<dyn Replica>> {
        let mut replicas = self.replicas.write().unwrap_or_else(PoisonError::into_inner);
        replicas.remove(&range_id)
    }

    pub fn get(&self, range_id: RangeId) -> Option<Arc<dyn Replica>> {
        let replicas = self.replicas.read().unwrap_or_else(PoisonError::into_inner);
        replicas.get(&range_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.replicas.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<RangeId> {
        let replicas = self.replicas.read().unwrap_or_else(PoisonError::into_inner);
        replicas.keys().copied().collect()
    }
}

impl ReplicaSource for ReplicaMap {
    fn replicas(&self) -> Vec<Arc<dyn Replica>> {
        let replicas = self.replicas.read().unwrap_or_else(PoisonError::into_inner);
        replicas.values().cloned().collect()
    }
}

/// A storage node's maintenance machinery.
///
/// The store hosts replicas, owns every queue explicitly and runs one scanner
/// that feeds them. Queues and scanner share one stopper token, so
/// [`Store::stop`] tears everything down together.
pub struct Store {
    store_id: StoreId,
    replicas: Arc<ReplicaMap>,
    scanner: Arc<ReplicaScanner>,
    stopper: CancellationToken,
    scanner_task: Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    pub fn new(store_id: StoreId, scanner_config: ScannerConfig, queues: Vec<Arc<dyn Queue>>) -> Self {
        debug!(%store_id, queues = queues.len(), "Store::new: called");
        let replicas = Arc::new(ReplicaMap::new());
        let source: Arc<dyn ReplicaSource> = Arc::clone(&replicas) as Arc<dyn ReplicaSource>;
        let scanner = Arc::new(ReplicaScanner::new(scanner_config, source, queues));
        Self {
            store_id,
            replicas,
            scanner,
            stopper: CancellationToken::new(),
            scanner_task: Mutex::new(None),
        }
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn queues(&self) -> &[Arc<dyn Queue>] {
        self.scanner.queues()
    }

    pub fn scanner(&self) -> &Arc<ReplicaScanner> {
        &self.scanner
    }

    pub fn replica(&self, range_id: RangeId) -> Option<Arc<dyn Replica>> {
        self.replicas.get(range_id)
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn range_ids(&self) -> Vec<RangeId> {
        self.replicas.ids()
    }

    /// Host a replica and offer it to every queue right away. Returns the
    /// number of queues that admitted it.
    pub fn add_replica(&self, replica: Arc<dyn Replica>) -> usize {
        let range_id = replica.range_id();
        debug!(store_id = %self.store_id, %range_id, "Store::add_replica: called");
        if replica.store_id() != self.store_id {
            warn!(store_id = %self.store_id, %range_id, owner = %replica.store_id(), "Replica belongs to another store");
        }
        self.replicas.insert(Arc::clone(&replica));
        self.scanner.add_replica(&replica, Instant::now())
    }

    /// Stop hosting a replica and drop it from every queue
    pub fn remove_replica(&self, range_id: RangeId) -> Option<Arc<dyn Replica>> {
        debug!(store_id = %self.store_id, %range_id, "Store::remove_replica: called");
        let removed = self.replicas.remove(range_id);
        self.scanner.remove_replica(range_id);
        removed
    }

    /// Start every queue and the scanner loop
    pub fn start(&self) -> Result<(), QueueError> {
        debug!(store_id = %self.store_id, "Store::start: called");
        for queue in self.queues() {
            if let Err(err) = queue.start(&self.stopper) {
                // Queues started so far watch the stopper
                warn!(store_id = %self.store_id, queue = queue.name(), error = %err, "Queue failed to start");
                self.stopper.cancel();
                return Err(err);
            }
        }

        let mut task = self.scanner_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_none() {
            *task = Some(tokio::spawn(Arc::clone(&self.scanner).run(self.stopper.clone())));
        }
        info!(store_id = %self.store_id, queues = self.queues().len(), "Store started");
        Ok(())
    }

    /// Cancel the scanner and every queue, then wait for them. Idempotent.
    pub async fn stop(&self) {
        debug!(store_id = %self.store_id, "Store::stop: called");
        self.stopper.cancel();

        let task = self.scanner_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task
            && let Err(err) = task.await
        {
            warn!(store_id = %self.store_id, error = %err, "Scanner task failed");
        }

        for queue in self.queues() {
            queue.stop().await;
        }
        info!(store_id = %self.store_id, "Store stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopper.is_cancelled()
    }

    /// Check every queue, reporting the first violation found
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.queues().iter().try_for_each(|queue| queue.check_invariants())
    }

    /// Metrics summed over every queue
    pub fn metrics(&self) -> QueueMetricsSnapshot {
        let mut total = QueueMetricsSnapshot::default();
        for queue in self.queues() {
            total.merge(&queue.metrics());
        }
        total
    }
}
