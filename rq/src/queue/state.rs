//! Queue bookkeeping guarded by the queue lock
//!
//! Every item lives in exactly one place: the ready index, the backoff set,
//! the purgatory map, or with a worker (processing). `QueueState` owns all of
//! them and is only ever touched while holding the queue's single mutex.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::domain::{RangeId, Replica};

use super::error::{InvariantViolation, ProcessError};
use super::index::{PriorityIndex, QueueKey};
use super::metrics::QueueMetrics;

/// Longest delay honoured between regular-error retries
const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Where an item currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemStatus {
    /// Ready to be picked up by a worker
    Queued,
    /// Queued, waiting out a retry delay
    Backoff,
    /// Owned by a worker
    Processing,
    /// Quarantined until the purgatory wake signal
    Purgatory,
}

#[derive(Debug, Clone, Copy)]
enum ItemState {
    Queued,
    Backoff { ready_at: Instant, seq: u64 },
    Processing { requeue: Option<f64>, remove_on_completion: bool },
    Purgatory,
}

impl ItemState {
    fn status(&self) -> ItemStatus {
        match self {
            Self::Queued => ItemStatus::Queued,
            Self::Backoff { .. } => ItemStatus::Backoff,
            Self::Processing { .. } => ItemStatus::Processing,
            Self::Purgatory => ItemStatus::Purgatory,
        }
    }
}

struct ItemRecord {
    replica: Arc<dyn Replica>,
    priority: f64,
    attempts: u32,
    state: ItemState,
}

/// Result of an insertion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddOutcome {
    /// New entry; `evicted` was pushed out to make room
    Added { evicted: Option<RangeId> },
    /// Already queued, priority updated
    Updated,
    /// Processing right now; it will be queued again once done
    RequeueMarked,
    /// Quarantined; left alone
    InPurgatory,
    /// Queue full of items with higher or equal priority
    Full,
}

impl AddOutcome {
    pub fn added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoveOutcome {
    Removed,
    /// Processing; dropped once the worker returns
    Deferred,
    Absent,
}

/// How a processing attempt ended
#[derive(Debug)]
pub(crate) enum Completion {
    Success,
    /// Benign error or stale replica, no retry
    Dropped,
    /// Regular error or timeout, retry after backoff
    Retry,
    Purgatory(ProcessError),
    /// Queue is shutting down
    Cancelled,
}

/// Where a finished item went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    Done,
    Dropped,
    Requeued,
    Removed,
    Backoff { attempt: u32, delay: Duration },
    Purgatory,
    /// No processing record found (queue was cleared)
    Unknown,
}

enum Room {
    Free,
    Evicted(RangeId),
    Full,
}

pub(crate) struct QueueState {
    max_size: usize,
    max_concurrency: usize,
    next_seq: u64,
    records: HashMap<RangeId, ItemRecord>,
    ready: PriorityIndex,
    backoff: BTreeSet<(Instant, u64, RangeId)>,
    purgatory: HashMap<RangeId, ProcessError>,
    processing: usize,
    metrics: Arc<QueueMetrics>,
}

impl QueueState {
    pub fn new(max_size: usize, max_concurrency: usize, metrics: Arc<QueueMetrics>) -> Self {
        Self {
            max_size,
            max_concurrency,
            next_seq: 0,
            records: HashMap::new(),
            ready: PriorityIndex::new(),
            backoff: BTreeSet::new(),
            purgatory: HashMap::new(),
            processing: 0,
            metrics,
        }
    }

    /// Items held in the queue, ready or backing off
    pub fn len(&self) -> usize {
        self.ready.len() + self.backoff.len()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn purgatory_len(&self) -> usize {
        self.purgatory.len()
    }

    pub fn processing_len(&self) -> usize {
        self.processing
    }

    /// Items tracked in any state
    pub fn tracked_len(&self) -> usize {
        self.records.len()
    }

    pub fn status(&self, range_id: RangeId) -> Option<ItemStatus> {
        self.records.get(&range_id).map(|record| record.state.status())
    }

    pub fn purgatory_error(&self, range_id: RangeId) -> Option<String> {
        self.purgatory.get(&range_id).map(ToString::to_string)
    }

    pub fn next_backoff_deadline(&self) -> Option<Instant> {
        self.backoff.first().map(|(ready_at, _, _)| *ready_at)
    }

    /// Insert a new item or refresh an existing one
    pub fn insert(&mut self, replica: Arc<dyn Replica>, priority: f64) -> AddOutcome {
        let priority = if priority.is_nan() { 0.0 } else { priority };
        let range_id = replica.range_id();

        if let Some(record) = self.records.get_mut(&range_id) {
            record.replica = replica;
            return match &mut record.state {
                ItemState::Queued => {
                    record.priority = priority;
                    self.ready.update_priority(range_id, priority);
                    AddOutcome::Updated
                }
                ItemState::Backoff { .. } => {
                    record.priority = priority;
                    AddOutcome::Updated
                }
                ItemState::Processing {
                    requeue,
                    remove_on_completion,
                } => {
                    // Latest call wins over an earlier removal
                    *requeue = Some(priority);
                    *remove_on_completion = false;
                    AddOutcome::RequeueMarked
                }
                ItemState::Purgatory => AddOutcome::InPurgatory,
            };
        }

        let evicted = match self.make_room(priority) {
            Room::Full => return AddOutcome::Full,
            Room::Evicted(victim) => Some(victim),
            Room::Free => None,
        };
        let key = self.next_key(priority);
        self.ready.insert(range_id, key);
        self.records.insert(
            range_id,
            ItemRecord {
                replica,
                priority,
                attempts: 0,
                state: ItemState::Queued,
            },
        );
        self.sync_gauges();
        AddOutcome::Added { evicted }
    }

    pub fn remove(&mut self, range_id: RangeId) -> RemoveOutcome {
        let Some(record) = self.records.get_mut(&range_id) else {
            return RemoveOutcome::Absent;
        };
        match &mut record.state {
            ItemState::Processing {
                requeue,
                remove_on_completion,
            } => {
                *requeue = None;
                *remove_on_completion = true;
                return RemoveOutcome::Deferred;
            }
            ItemState::Queued => {
                self.ready.remove(range_id);
            }
            ItemState::Backoff { ready_at, seq } => {
                self.backoff.remove(&(*ready_at, *seq, range_id));
            }
            ItemState::Purgatory => {
                self.purgatory.remove(&range_id);
            }
        }
        self.records.remove(&range_id);
        self.sync_gauges();
        RemoveOutcome::Removed
    }

    /// Hand the highest-priority ready item to a worker
    pub fn pop_ready(&mut self, now: Instant) -> Option<(RangeId, Arc<dyn Replica>)> {
        self.promote_due(now);
        let (range_id, _) = self.ready.pop_max()?;
        let record = self.records.get_mut(&range_id)?;
        record.state = ItemState::Processing {
            requeue: None,
            remove_on_completion: false,
        };
        let replica = Arc::clone(&record.replica);
        self.processing += 1;
        self.sync_gauges();
        Some((range_id, replica))
    }

    /// Route a processing outcome and release the worker's claim on the item
    pub fn finish<F>(
        &mut self,
        range_id: RangeId,
        completion: Completion,
        now: Instant,
        elapsed: Duration,
        timer: F,
    ) -> Routed
    where
        F: FnOnce(u32) -> Duration,
    {
        self.processing = self.processing.saturating_sub(1);
        let routed = self.route(range_id, completion, now, elapsed, timer);
        self.sync_gauges();
        routed
    }

    fn route<F>(&mut self, range_id: RangeId, completion: Completion, now: Instant, elapsed: Duration, timer: F) -> Routed
    where
        F: FnOnce(u32) -> Duration,
    {
        let Some(record) = self.records.get_mut(&range_id) else {
            return Routed::Unknown;
        };
        let ItemState::Processing {
            requeue,
            remove_on_completion,
        } = record.state
        else {
            return Routed::Unknown;
        };

        // A removed item still counts the call it was in
        match completion {
            Completion::Cancelled => {}
            Completion::Success => {
                self.metrics.record_processing(elapsed);
                self.metrics.record_success();
            }
            Completion::Dropped => self.metrics.record_processing(elapsed),
            Completion::Retry | Completion::Purgatory(_) => {
                self.metrics.record_processing(elapsed);
                self.metrics.record_failure();
            }
        }

        if remove_on_completion {
            self.records.remove(&range_id);
            return Routed::Removed;
        }

        match completion {
            Completion::Cancelled => {
                self.records.remove(&range_id);
                Routed::Dropped
            }
            Completion::Success => self.requeue_or_drop(range_id, requeue, Routed::Done),
            Completion::Dropped => self.requeue_or_drop(range_id, requeue, Routed::Dropped),
            Completion::Retry => {
                record.attempts += 1;
                let attempt = record.attempts;
                let priority = record.priority;
                if matches!(self.make_room(priority), Room::Full) {
                    self.records.remove(&range_id);
                    return Routed::Dropped;
                }
                let delay = timer(attempt).min(MAX_RETRY_DELAY);
                let ready_at = now + delay;
                let seq = self.next_seq;
                self.next_seq += 1;
                self.backoff.insert((ready_at, seq, range_id));
                if let Some(record) = self.records.get_mut(&range_id) {
                    record.state = ItemState::Backoff { ready_at, seq };
                }
                Routed::Backoff { attempt, delay }
            }
            Completion::Purgatory(err) => {
                record.state = ItemState::Purgatory;
                self.purgatory.insert(range_id, err);
                Routed::Purgatory
            }
        }
    }

    fn requeue_or_drop(&mut self, range_id: RangeId, requeue: Option<f64>, otherwise: Routed) -> Routed {
        let Some(priority) = requeue else {
            self.records.remove(&range_id);
            return otherwise;
        };
        if matches!(self.make_room(priority), Room::Full) {
            self.records.remove(&range_id);
            return otherwise;
        }
        let key = self.next_key(priority);
        self.ready.insert(range_id, key);
        if let Some(record) = self.records.get_mut(&range_id) {
            record.priority = priority;
            record.attempts = 0;
            record.state = ItemState::Queued;
        }
        Routed::Requeued
    }

    /// Move every quarantined item back into the ready index. Returns the
    /// number re-admitted; items that no longer fit are dropped.
    pub fn drain_purgatory(&mut self) -> usize {
        let mut drained: Vec<(RangeId, f64)> = self
            .purgatory
            .drain()
            .filter_map(|(range_id, _)| self.records.get(&range_id).map(|r| (range_id, r.priority)))
            .collect();
        // Highest priority claims free slots first
        drained.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut requeued = 0;
        for (range_id, priority) in drained {
            if matches!(self.make_room(priority), Room::Full) {
                self.records.remove(&range_id);
                continue;
            }
            let key = self.next_key(priority);
            self.ready.insert(range_id, key);
            if let Some(record) = self.records.get_mut(&range_id) {
                record.attempts = 0;
                record.state = ItemState::Queued;
            }
            requeued += 1;
        }
        self.sync_gauges();
        requeued
    }

    /// Drop everything. Used when the queue stops.
    pub fn clear(&mut self) {
        self.records.clear();
        self.ready.clear();
        self.backoff.clear();
        self.purgatory.clear();
        self.processing = 0;
        self.sync_gauges();
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let backoff_ids: HashSet<RangeId> = self.backoff.iter().map(|(_, _, range_id)| *range_id).collect();

        for range_id in self.purgatory.keys() {
            if self.ready.contains(*range_id) || backoff_ids.contains(range_id) {
                return Err(InvariantViolation::QueuedAndInPurgatory(*range_id));
            }
        }

        if self.len() > self.max_size {
            return Err(InvariantViolation::Oversized {
                len: self.len(),
                max: self.max_size,
            });
        }

        if self.processing > self.max_concurrency {
            return Err(InvariantViolation::TooManyProcessing {
                processing: self.processing,
                max: self.max_concurrency,
            });
        }

        if !self.ready.is_consistent() || backoff_ids.len() != self.backoff.len() {
            return Err(InvariantViolation::IndexInconsistent);
        }

        let mut processing = 0;
        for (range_id, record) in &self.records {
            let range_id = *range_id;
            let queued = self.ready.contains(range_id);
            let backing_off = backoff_ids.contains(&range_id);
            let quarantined = self.purgatory.contains_key(&range_id);
            let consistent = match record.state {
                ItemState::Processing { .. } => {
                    processing += 1;
                    if queued || backing_off {
                        return Err(InvariantViolation::ProcessingButQueued(range_id));
                    }
                    !quarantined
                }
                ItemState::Queued => queued && !backing_off && !quarantined,
                ItemState::Backoff { ready_at, seq } => {
                    !queued && !quarantined && self.backoff.contains(&(ready_at, seq, range_id))
                }
                ItemState::Purgatory => quarantined && !queued && !backing_off,
            };
            if !consistent {
                return Err(InvariantViolation::StateMismatch {
                    range_id,
                    detail: format!(
                        "record says {:?}, queued={queued} backoff={backing_off} purgatory={quarantined}",
                        record.state.status()
                    ),
                });
            }
        }

        let untracked = self
            .ready
            .ids()
            .chain(backoff_ids.iter().copied())
            .chain(self.purgatory.keys().copied())
            .find(|range_id| !self.records.contains_key(range_id));
        if let Some(range_id) = untracked {
            return Err(InvariantViolation::StateMismatch {
                range_id,
                detail: "no item record".to_string(),
            });
        }

        if processing != self.processing {
            return Err(InvariantViolation::GaugeMismatch {
                gauge: "processing-records",
                expected: self.processing as i64,
                actual: processing as i64,
            });
        }

        let gauges = [
            ("pending", self.len() as i64, self.metrics.pending()),
            ("purgatory", self.purgatory.len() as i64, self.metrics.purgatory()),
            ("processing", self.processing as i64, self.metrics.processing()),
        ];
        for (gauge, expected, actual) in gauges {
            if expected != actual {
                return Err(InvariantViolation::GaugeMismatch { gauge, expected, actual });
            }
        }

        Ok(())
    }

    fn next_key(&mut self, priority: f64) -> QueueKey {
        let seq = self.next_seq;
        self.next_seq += 1;
        QueueKey { priority, seq }
    }

    /// Make room for one more item of `priority`, evicting the lowest-priority
    /// ready item if it ranks strictly below the newcomer
    fn make_room(&mut self, priority: f64) -> Room {
        if self.len() < self.max_size {
            return Room::Free;
        }
        match self.ready.peek_min() {
            Some((victim, key)) if key.priority < priority => {
                self.ready.remove(victim);
                self.records.remove(&victim);
                self.metrics.record_eviction();
                Room::Evicted(victim)
            }
            _ => Room::Full,
        }
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some(&(ready_at, _, _)) = self.backoff.first() {
            if ready_at > now {
                break;
            }
            let Some((_, _, range_id)) = self.backoff.pop_first() else {
                break;
            };
            let Some(record) = self.records.get_mut(&range_id) else {
                continue;
            };
            record.state = ItemState::Queued;
            let key = QueueKey {
                priority: record.priority,
                seq: self.next_seq,
            };
            self.next_seq += 1;
            self.ready.insert(range_id, key);
        }
    }

    fn sync_gauges(&self) {
        self.metrics.set_pending(self.len());
        self.metrics.set_purgatory(self.purgatory.len());
        self.metrics.set_processing(self.processing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DestroyReason, LeaseStatus, RangeDescriptor, StoreId};

    struct TestReplica(RangeId);

    impl Replica for TestReplica {
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
            RangeDescriptor::new(self.0, b"".to_vec(), b"".to_vec())
        }
        fn lease_status(&self, _now: Instant) -> LeaseStatus {
            LeaseStatus::Valid { holder: StoreId(1) }
        }
    }

    fn replica(id: i64) -> Arc<dyn Replica> {
        Arc::new(TestReplica(RangeId(id)))
    }

    fn state(max_size: usize) -> QueueState {
        QueueState::new(max_size, 2, Arc::new(QueueMetrics::new()))
    }

    fn no_delay(_attempt: u32) -> Duration {
        Duration::ZERO
    }

    #[test]
    fn test_eviction_of_lowest_priority() {
        let mut s = state(2);
        assert!(s.insert(replica(1), 1.0).added());
        assert!(s.insert(replica(2), 2.0).added());
        assert_eq!(
            s.insert(replica(3), 3.0),
            AddOutcome::Added {
                evicted: Some(RangeId(1))
            }
        );
        assert_eq!(s.status(RangeId(1)), None);
        assert_eq!(s.len(), 2);
        // Lower or equal priority is a no-op when full
        assert_eq!(s.insert(replica(4), 2.0), AddOutcome::Full);
        assert_eq!(s.status(RangeId(4)), None);
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_insert_updates_priority() {
        let mut s = state(10);
        assert!(s.insert(replica(1), 1.0).added());
        assert!(s.insert(replica(2), 2.0).added());
        assert_eq!(s.insert(replica(1), 5.0), AddOutcome::Updated);
        assert_eq!(s.len(), 2);
        let (first, _) = s.pop_ready(Instant::now()).unwrap();
        assert_eq!(first, RangeId(1));
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_pop_marks_processing() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        let (id, _) = s.pop_ready(Instant::now()).unwrap();
        assert_eq!(s.status(id), Some(ItemStatus::Processing));
        assert_eq!(s.processing_len(), 1);
        assert_eq!(s.len(), 0);
        s.check_invariants().unwrap();

        let routed = s.finish(id, Completion::Success, Instant::now(), Duration::from_millis(1), no_delay);
        assert_eq!(routed, Routed::Done);
        assert_eq!(s.status(id), None);
        assert_eq!(s.processing_len(), 0);
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_while_processing_is_deferred() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        let (id, _) = s.pop_ready(Instant::now()).unwrap();
        assert_eq!(s.remove(id), RemoveOutcome::Deferred);
        assert_eq!(s.status(id), Some(ItemStatus::Processing));
        let routed = s.finish(id, Completion::Retry, Instant::now(), Duration::from_millis(3), no_delay);
        assert_eq!(routed, Routed::Removed);
        assert_eq!(s.status(id), None);
        assert_eq!(s.remove(id), RemoveOutcome::Absent);
        s.check_invariants().unwrap();

        // The failed call is still counted
        let snap = s.metrics.snapshot();
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.processing_time(), Duration::from_millis(3));
    }

    #[test]
    fn test_removed_success_is_counted() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        let (id, _) = s.pop_ready(Instant::now()).unwrap();
        s.remove(id);
        let routed = s.finish(id, Completion::Success, Instant::now(), Duration::from_millis(2), no_delay);
        assert_eq!(routed, Routed::Removed);
        let snap = s.metrics.snapshot();
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.processing_time(), Duration::from_millis(2));
    }

    #[test]
    fn test_readd_after_remove_while_processing_requeues() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        let (id, _) = s.pop_ready(Instant::now()).unwrap();
        assert_eq!(s.remove(id), RemoveOutcome::Deferred);
        assert_eq!(s.insert(replica(1), 4.0), AddOutcome::RequeueMarked);

        let routed = s.finish(id, Completion::Success, Instant::now(), Duration::ZERO, no_delay);
        assert_eq!(routed, Routed::Requeued);
        assert_eq!(s.status(id), Some(ItemStatus::Queued));
        assert_eq!(s.len(), 1);
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_failed_calls_add_processing_time() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        s.insert(replica(2), 1.0);
        let (a, _) = s.pop_ready(Instant::now()).unwrap();
        let (b, _) = s.pop_ready(Instant::now()).unwrap();
        s.finish(a, Completion::Retry, Instant::now(), Duration::from_millis(5), no_delay);
        s.finish(
            b,
            Completion::Purgatory(ProcessError::purgatory("no target")),
            Instant::now(),
            Duration::from_millis(7),
            no_delay,
        );
        let snap = s.metrics.snapshot();
        assert_eq!(snap.failures, 2);
        assert_eq!(snap.successes, 0);
        assert_eq!(snap.processing_time(), Duration::from_millis(12));
    }

    #[test]
    fn test_requeue_while_processing() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        let (id, _) = s.pop_ready(Instant::now()).unwrap();
        assert_eq!(s.insert(replica(1), 4.0), AddOutcome::RequeueMarked);
        s.check_invariants().unwrap();
        let routed = s.finish(id, Completion::Success, Instant::now(), Duration::ZERO, no_delay);
        assert_eq!(routed, Routed::Requeued);
        assert_eq!(s.status(id), Some(ItemStatus::Queued));
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_retry_goes_to_backoff_then_ready() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        let start = Instant::now();
        let (id, _) = s.pop_ready(start).unwrap();
        let routed = s.finish(id, Completion::Retry, start, Duration::ZERO, |attempt| {
            Duration::from_millis(100 * attempt as u64)
        });
        assert_eq!(
            routed,
            Routed::Backoff {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(s.status(id), Some(ItemStatus::Backoff));
        assert_eq!(s.len(), 1);
        s.check_invariants().unwrap();

        // Not ready yet
        assert!(s.pop_ready(start).is_none());
        assert_eq!(s.next_backoff_deadline(), Some(start + Duration::from_millis(100)));

        let (again, _) = s.pop_ready(start + Duration::from_millis(100)).unwrap();
        assert_eq!(again, id);
        let routed = s.finish(id, Completion::Retry, start, Duration::ZERO, |attempt| {
            Duration::from_millis(100 * attempt as u64)
        });
        assert!(matches!(routed, Routed::Backoff { attempt: 2, .. }));
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_purgatory_round_trip() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        s.insert(replica(2), 2.0);
        let now = Instant::now();
        for _ in 0..2 {
            let (id, _) = s.pop_ready(now).unwrap();
            let routed = s.finish(
                id,
                Completion::Purgatory(ProcessError::purgatory("no live targets")),
                now,
                Duration::ZERO,
                no_delay,
            );
            assert_eq!(routed, Routed::Purgatory);
        }
        assert_eq!(s.purgatory_len(), 2);
        assert_eq!(s.len(), 0);
        assert!(s.purgatory_error(RangeId(1)).unwrap().contains("no live targets"));
        // Admission while quarantined is a no-op
        assert_eq!(s.insert(replica(1), 9.0), AddOutcome::InPurgatory);
        s.check_invariants().unwrap();

        assert_eq!(s.drain_purgatory(), 2);
        assert_eq!(s.purgatory_len(), 0);
        assert_eq!(s.len(), 2);
        assert_eq!(s.status(RangeId(1)), Some(ItemStatus::Queued));
        s.check_invariants().unwrap();
        assert_eq!(s.drain_purgatory(), 0);
    }

    #[test]
    fn test_remove_from_each_place() {
        let mut s = state(10);
        let now = Instant::now();
        s.insert(replica(1), 1.0);
        s.insert(replica(2), 2.0);
        s.insert(replica(3), 3.0);

        let (three, _) = s.pop_ready(now).unwrap();
        s.finish(three, Completion::Purgatory(ProcessError::purgatory("x")), now, Duration::ZERO, no_delay);
        let (two, _) = s.pop_ready(now).unwrap();
        s.finish(two, Completion::Retry, now, Duration::ZERO, |_| Duration::from_secs(60));

        assert_eq!(s.remove(RangeId(1)), RemoveOutcome::Removed);
        assert_eq!(s.remove(RangeId(2)), RemoveOutcome::Removed);
        assert_eq!(s.remove(RangeId(3)), RemoveOutcome::Removed);
        assert_eq!(s.len(), 0);
        assert_eq!(s.purgatory_len(), 0);
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_clear() {
        let mut s = state(10);
        s.insert(replica(1), 1.0);
        s.insert(replica(2), 1.0);
        s.pop_ready(Instant::now());
        s.clear();
        assert_eq!(s.len(), 0);
        assert_eq!(s.processing_len(), 0);
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_nan_priority_is_treated_as_zero() {
        let mut s = state(10);
        s.insert(replica(1), f64::NAN);
        s.insert(replica(2), 0.5);
        let (first, _) = s.pop_ready(Instant::now()).unwrap();
        assert_eq!(first, RangeId(2));
    }
}
