//! Queue core: admission, worker pool and purgatory loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{RangeId, Replica, SystemConfig, SystemConfigReceiver, system_config_channel};

use super::config::QueueConfig;
use super::error::{ErrorClass, InvariantViolation, ProcessError, QueueError};
use super::metrics::{QueueMetrics, QueueMetricsSnapshot};
use super::policy::{Admission, QueuePolicy};
use super::state::{AddOutcome, Completion, ItemStatus, QueueState, RemoveOutcome, Routed};

/// Type-erased queue handle, so one scanner can drive queues with different policies
#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Offer a replica to the queue's admission policy
    fn maybe_add(&self, replica: Arc<dyn Replica>, now: Instant) -> Result<bool, QueueError>;

    fn remove(&self, range_id: RangeId);

    fn start(&self, stopper: &CancellationToken) -> Result<(), QueueError>;

    async fn stop(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purgatory_len(&self) -> usize;

    fn metrics(&self) -> QueueMetricsSnapshot;

    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

enum Lifecycle {
    Created,
    Running(Vec<JoinHandle<()>>),
    Stopped,
}

struct Shared<P> {
    name: String,
    config: QueueConfig,
    policy: P,
    state: Mutex<QueueState>,
    metrics: Arc<QueueMetrics>,
    notify: Notify,
    cancel: CancellationToken,
    system_config: SystemConfigReceiver,
    lifecycle: Mutex<Lifecycle>,
    active_loops: AtomicUsize,
}

/// A priority queue of replicas awaiting a maintenance operation.
///
/// Admission and removal are synchronous and never wait on workers. After
/// [`BaseQueue::start`], `max_concurrency` worker loops pop the highest-priority
/// ready item and hand it to the policy's `process`; a single purgatory loop
/// re-admits quarantined items whenever the policy's wake signal fires.
/// Cloning yields another handle to the same queue.
pub struct BaseQueue<P: QueuePolicy> {
    shared: Arc<Shared<P>>,
}

impl<P: QueuePolicy> Clone for BaseQueue<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: QueuePolicy> BaseQueue<P> {
    /// Create a queue that never observes a system config
    pub fn new(name: impl Into<String>, policy: P, config: QueueConfig) -> Result<Self, QueueError> {
        let (_tx, rx) = system_config_channel();
        Self::with_system_config(name, policy, config, rx)
    }

    /// Create a queue fed by a system config channel
    pub fn with_system_config(
        name: impl Into<String>,
        policy: P,
        config: QueueConfig,
        system_config: SystemConfigReceiver,
    ) -> Result<Self, QueueError> {
        let name = name.into();
        debug!(%name, ?config, "BaseQueue::new: called");
        config.validate()?;

        let metrics = Arc::new(QueueMetrics::new());
        let state = QueueState::new(config.max_size, config.max_concurrency, Arc::clone(&metrics));
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                config,
                policy,
                state: Mutex::new(state),
                metrics,
                notify: Notify::new(),
                cancel: CancellationToken::new(),
                system_config,
                lifecycle: Mutex::new(Lifecycle::Created),
                active_loops: AtomicUsize::new(0),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    pub fn policy(&self) -> &P {
        &self.shared.policy
    }

    /// Offer a replica to the admission policy.
    ///
    /// Returns `Ok(true)` only when a new entry was created. Updating a queued
    /// entry, marking a processing one for requeue, or skipping all return
    /// `Ok(false)`.
    pub fn maybe_add(&self, replica: Arc<dyn Replica>, now: Instant) -> Result<bool, QueueError> {
        let range_id = replica.range_id();
        debug!(queue = %self.shared.name, %range_id, "BaseQueue::maybe_add: called");
        if self.is_stopped() {
            return Err(self.stopped());
        }

        let system_config = self.shared.current_system_config();
        if let Some(reason) = self.shared.admission_check(replica.as_ref(), system_config.as_deref(), now) {
            debug!(queue = %self.shared.name, %range_id, reason, "BaseQueue::maybe_add: skipped");
            return Ok(false);
        }

        match self
            .shared
            .policy
            .should_queue(now, replica.as_ref(), system_config.as_deref())
        {
            Admission::Skip => Ok(false),
            Admission::Queue { priority } => self.add(replica, priority),
        }
    }

    /// Insert or update a replica at `priority`, bypassing the admission policy
    pub fn add(&self, replica: Arc<dyn Replica>, priority: f64) -> Result<bool, QueueError> {
        let range_id = replica.range_id();
        debug!(queue = %self.shared.name, %range_id, priority, "BaseQueue::add: called");
        let outcome = {
            let mut state = self.shared.lock_state();
            // Checked under the lock so nothing lands after stop clears the state
            if self.shared.cancel.is_cancelled() {
                return Err(self.stopped());
            }
            state.insert(replica, priority)
        };

        match outcome {
            AddOutcome::Added { evicted } => {
                if let Some(victim) = evicted {
                    debug!(queue = %self.shared.name, %victim, %range_id, "BaseQueue::add: evicted lower priority item");
                }
                self.shared.notify.notify_one();
            }
            AddOutcome::Full => {
                debug!(queue = %self.shared.name, %range_id, priority, "BaseQueue::add: queue full, dropped");
            }
            AddOutcome::Updated | AddOutcome::RequeueMarked | AddOutcome::InPurgatory => {
                debug!(queue = %self.shared.name, %range_id, ?outcome, "BaseQueue::add: already tracked");
            }
        }
        Ok(outcome.added())
    }

    /// Remove a replica from the queue, backoff or purgatory. A replica being
    /// processed is dropped once its processing call returns.
    pub fn remove(&self, range_id: RangeId) {
        debug!(queue = %self.shared.name, %range_id, "BaseQueue::remove: called");
        if self.is_stopped() {
            return;
        }
        let outcome = self.shared.lock_state().remove(range_id);
        if outcome == RemoveOutcome::Deferred {
            debug!(queue = %self.shared.name, %range_id, "BaseQueue::remove: processing, removal deferred");
        }
    }

    /// Items held in the queue, ready or backing off
    pub fn len(&self) -> usize {
        self.shared.lock_state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purgatory_len(&self) -> usize {
        self.shared.lock_state().purgatory_len()
    }

    pub fn processing_len(&self) -> usize {
        self.shared.lock_state().processing_len()
    }

    /// Items tracked in any state: queued, backing off, processing or in purgatory
    pub fn tracked_len(&self) -> usize {
        self.shared.lock_state().tracked_len()
    }

    /// Where a replica currently is, if tracked
    pub fn status(&self, range_id: RangeId) -> Option<ItemStatus> {
        self.shared.lock_state().status(range_id)
    }

    /// True if the replica is queued (ready or backing off)
    pub fn contains(&self, range_id: RangeId) -> bool {
        matches!(self.status(range_id), Some(ItemStatus::Queued | ItemStatus::Backoff))
    }

    /// Last error recorded for a quarantined replica
    pub fn purgatory_error(&self, range_id: RangeId) -> Option<String> {
        self.shared.lock_state().purgatory_error(range_id)
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.shared.lock_state().check_invariants()
    }

    /// Panics if any structural invariant is broken
    pub fn assert_invariants(&self) {
        if let Err(violation) = self.check_invariants() {
            panic!("queue {} invariant violated: {violation}", self.shared.name);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Number of worker and purgatory loops still running
    pub fn active_loops(&self) -> usize {
        self.shared.active_loops.load(Ordering::SeqCst)
    }

    /// Spawn the worker pool and purgatory loop. The queue stops processing
    /// when `stopper` is cancelled; call [`BaseQueue::stop`] to join the tasks.
    pub fn start(&self, stopper: &CancellationToken) -> Result<(), QueueError> {
        debug!(queue = %self.shared.name, "BaseQueue::start: called");
        let mut lifecycle = lock(&self.shared.lifecycle);
        match &*lifecycle {
            Lifecycle::Running(_) => {
                return Err(QueueError::AlreadyStarted {
                    name: self.shared.name.clone(),
                });
            }
            Lifecycle::Stopped => return Err(self.stopped()),
            Lifecycle::Created => {}
        }
        if self.is_stopped() {
            *lifecycle = Lifecycle::Stopped;
            return Err(self.stopped());
        }

        let workers = self.shared.config.max_concurrency;
        let mut handles = Vec::with_capacity(workers + 2);
        for worker in 0..workers {
            handles.push(tokio::spawn(worker_loop(Arc::clone(&self.shared), worker)));
        }
        handles.push(tokio::spawn(purgatory_loop(Arc::clone(&self.shared))));

        let cancel = self.shared.cancel.clone();
        let stopper = stopper.clone();
        handles.push(tokio::spawn(async move {
            tokio::select! {
                _ = stopper.cancelled() => cancel.cancel(),
                _ = cancel.cancelled() => {}
            }
        }));

        *lifecycle = Lifecycle::Running(handles);
        info!(queue = %self.shared.name, workers, "Queue started");
        Ok(())
    }

    /// Cancel every loop, wait for them to exit and drop all items. Idempotent.
    pub async fn stop(&self) {
        debug!(queue = %self.shared.name, "BaseQueue::stop: called");
        let previous = {
            let mut lifecycle = lock(&self.shared.lifecycle);
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };
        let handles = match previous {
            Lifecycle::Running(handles) => handles,
            Lifecycle::Created | Lifecycle::Stopped => Vec::new(),
        };
        self.shared.cancel.cancel();

        let joined = handles.len();
        for handle in handles {
            if let Err(err) = handle.await
                && err.is_panic()
            {
                warn!(queue = %self.shared.name, error = %err, "Queue task panicked");
            }
        }

        self.shared.lock_state().clear();
        if joined > 0 {
            info!(queue = %self.shared.name, "Queue stopped");
        }
    }

    fn stopped(&self) -> QueueError {
        QueueError::Stopped {
            name: self.shared.name.clone(),
        }
    }
}

#[async_trait]
impl<P: QueuePolicy> Queue for BaseQueue<P> {
    fn name(&self) -> &str {
        BaseQueue::name(self)
    }

    fn maybe_add(&self, replica: Arc<dyn Replica>, now: Instant) -> Result<bool, QueueError> {
        BaseQueue::maybe_add(self, replica, now)
    }

    fn remove(&self, range_id: RangeId) {
        BaseQueue::remove(self, range_id)
    }

    fn start(&self, stopper: &CancellationToken) -> Result<(), QueueError> {
        BaseQueue::start(self, stopper)
    }

    async fn stop(&self) {
        BaseQueue::stop(self).await
    }

    fn len(&self) -> usize {
        BaseQueue::len(self)
    }

    fn purgatory_len(&self) -> usize {
        BaseQueue::purgatory_len(self)
    }

    fn metrics(&self) -> QueueMetricsSnapshot {
        BaseQueue::metrics(self)
    }

    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        BaseQueue::check_invariants(self)
    }
}

impl<P: QueuePolicy> Shared<P> {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.state)
    }

    fn current_system_config(&self) -> Option<Arc<SystemConfig>> {
        self.system_config.borrow().clone()
    }

    /// Reason to leave a replica alone at admission time, if any
    fn admission_check(
        &self,
        replica: &dyn Replica,
        system_config: Option<&SystemConfig>,
        now: Instant,
    ) -> Option<&'static str> {
        if let Some(reason) = self.processing_check(replica, system_config, now) {
            return Some(reason);
        }
        if !self.config.accepts_unsplit_ranges
            && let Some(system_config) = system_config
            && system_config.needs_split(&replica.desc())
        {
            return Some("range needs split");
        }
        None
    }

    /// Reason a popped replica must not be processed, if any
    fn processing_check(
        &self,
        replica: &dyn Replica,
        system_config: Option<&SystemConfig>,
        now: Instant,
    ) -> Option<&'static str> {
        if !replica.is_initialized() {
            return Some("replica not initialized");
        }
        if !replica.destroy_status().is_alive() {
            return Some("replica destroyed");
        }
        if self.config.needs_system_config && system_config.is_none() {
            return Some("no system config");
        }
        if self.config.needs_lease && !replica.lease_status(now).owned_by(replica.store_id()) {
            return Some("lease not held");
        }
        None
    }

    /// Run one popped item through the policy and route the outcome
    async fn process_one(&self, range_id: RangeId, replica: Arc<dyn Replica>) {
        let system_config = self.current_system_config();
        let (completion, elapsed) =
            match self.processing_check(replica.as_ref(), system_config.as_deref(), Instant::now()) {
                Some(reason) => {
                    debug!(queue = %self.name, %range_id, reason, "process_one: dropping replica");
                    (Completion::Dropped, Duration::ZERO)
                }
                None => self.run_process(range_id, replica, system_config).await,
            };

        let routed = self
            .lock_state()
            .finish(range_id, completion, Instant::now(), elapsed, |attempt| {
                self.policy.timer(attempt)
            });

        match routed {
            Routed::Requeued => {
                debug!(queue = %self.name, %range_id, "process_one: requeued");
                self.notify.notify_one();
            }
            Routed::Backoff { attempt, delay } => {
                debug!(queue = %self.name, %range_id, attempt, ?delay, "process_one: retry scheduled");
            }
            Routed::Removed => {
                debug!(queue = %self.name, %range_id, "process_one: removed after processing");
            }
            Routed::Done | Routed::Dropped | Routed::Purgatory | Routed::Unknown => {}
        }
    }

    async fn run_process(
        &self,
        range_id: RangeId,
        replica: Arc<dyn Replica>,
        system_config: Option<Arc<SystemConfig>>,
    ) -> (Completion, Duration) {
        let timeout = self.config.process_timeout();
        let started = Instant::now();
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return (Completion::Cancelled, started.elapsed()),
            result = tokio::time::timeout(timeout, self.policy.process(replica, system_config)) => result,
        };
        let elapsed = started.elapsed();

        let err = match result {
            Ok(Ok(())) => return (Completion::Success, elapsed),
            Ok(Err(err)) => err,
            Err(_) => ProcessError::Timeout(timeout),
        };

        let completion = match err.class() {
            ErrorClass::Regular => {
                warn!(queue = %self.name, %range_id, error = %err, "Processing failed, will retry");
                Completion::Retry
            }
            ErrorClass::Benign => {
                debug!(queue = %self.name, %range_id, error = %err, "Processing ended with benign error");
                Completion::Dropped
            }
            ErrorClass::Purgatory => {
                warn!(queue = %self.name, %range_id, error = %err, "Moving replica to purgatory");
                Completion::Purgatory(err)
            }
        };
        (completion, elapsed)
    }
}

/// Counts a running loop for as long as it lives
struct LoopGuard<'a>(&'a AtomicUsize);

impl<'a> LoopGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn worker_loop<P: QueuePolicy>(shared: Arc<Shared<P>>, worker: usize) {
    let _guard = LoopGuard::new(&shared.active_loops);
    debug!(queue = %shared.name, worker, "worker_loop: started");

    loop {
        if shared.cancel.is_cancelled() {
            break;
        }

        let next = {
            // Register interest before looking at the state so no wakeup is lost.
            // Dropped before processing so busy workers don't absorb wakeups.
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (popped, more_ready, next_deadline) = {
                let mut state = shared.lock_state();
                let popped = state.pop_ready(Instant::now());
                (popped, state.ready_len() > 0, state.next_backoff_deadline())
            };

            if popped.is_none() {
                let backoff_elapsed = async {
                    match next_deadline {
                        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    _ = shared.cancel.cancelled() => break,
                    _ = &mut notified => {}
                    _ = backoff_elapsed => {}
                }
            }
            popped.map(|item| (item, more_ready))
        };

        let Some(((range_id, replica), more_ready)) = next else {
            continue;
        };

        if more_ready {
            shared.notify.notify_one();
        }
        shared.process_one(range_id, replica).await;
    }

    debug!(queue = %shared.name, worker, "worker_loop: exited");
}

async fn purgatory_loop<P: QueuePolicy>(shared: Arc<Shared<P>>) {
    let _guard = LoopGuard::new(&shared.active_loops);
    debug!(queue = %shared.name, "purgatory_loop: started");

    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = shared.policy.purgatory_wake() => {}
        }

        let requeued = shared.lock_state().drain_purgatory();
        if requeued > 0 {
            debug!(queue = %shared.name, requeued, "purgatory_loop: re-admitted quarantined replicas");
            shared.notify.notify_waiters();
            shared.notify.notify_one();
        }
        tokio::task::yield_now().await;
    }

    debug!(queue = %shared.name, "purgatory_loop: exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DestroyReason, LeaseStatus, RangeDescriptor, StoreId};
    use std::sync::atomic::AtomicBool;

    struct TestReplica {
        id: RangeId,
        initialized: bool,
        leaseholder: bool,
    }

    impl Replica for TestReplica {
        fn range_id(&self) -> RangeId {
            self.id
        }
        fn store_id(&self) -> StoreId {
            StoreId(1)
        }
        fn is_initialized(&self) -> bool {
            self.initialized
        }
        fn destroy_status(&self) -> DestroyReason {
            DestroyReason::Alive
        }
        fn desc(&self) -> RangeDescriptor {
            RangeDescriptor::new(self.id, b"a".to_vec(), b"z".to_vec())
        }
        fn lease_status(&self, _now: Instant) -> LeaseStatus {
            if self.leaseholder {
                LeaseStatus::Valid { holder: StoreId(1) }
            } else {
                LeaseStatus::Expired
            }
        }
    }

    fn replica(id: i64) -> Arc<dyn Replica> {
        Arc::new(TestReplica {
            id: RangeId(id),
            initialized: true,
            leaseholder: true,
        })
    }

    /// Queues every replica at a priority equal to its id
    struct IdPriority {
        admit: AtomicBool,
    }

    impl IdPriority {
        fn new() -> Self {
            Self {
                admit: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl QueuePolicy for IdPriority {
        fn should_queue(&self, _now: Instant, replica: &dyn Replica, _cfg: Option<&SystemConfig>) -> Admission {
            Admission::from_decision(self.admit.load(Ordering::SeqCst), replica.range_id().0 as f64)
        }

        async fn process(&self, _replica: Arc<dyn Replica>, _cfg: Option<Arc<SystemConfig>>) -> Result<(), ProcessError> {
            Ok(())
        }

        fn timer(&self, _attempt: u32) -> Duration {
            Duration::from_millis(1)
        }
    }

    fn queue(config: QueueConfig) -> BaseQueue<IdPriority> {
        BaseQueue::new("test", IdPriority::new(), config).unwrap()
    }

    #[test]
    fn test_max_size_evicts_lowest_priority() {
        let q = queue(QueueConfig {
            max_size: 2,
            ..Default::default()
        });
        let now = Instant::now();
        assert!(q.maybe_add(replica(1), now).unwrap());
        assert!(q.maybe_add(replica(2), now).unwrap());
        assert!(q.maybe_add(replica(3), now).unwrap());

        assert_eq!(q.len(), 2);
        assert!(!q.contains(RangeId(1)));
        assert!(q.contains(RangeId(2)));
        assert!(q.contains(RangeId(3)));
        assert_eq!(q.metrics().evictions, 1);
        q.assert_invariants();
    }

    #[test]
    fn test_duplicate_add_keeps_one_entry() {
        let q = queue(QueueConfig::default());
        let now = Instant::now();
        assert!(q.maybe_add(replica(5), now).unwrap());
        for _ in 0..4 {
            assert!(!q.maybe_add(replica(5), now).unwrap());
        }
        assert_eq!(q.len(), 1);
        assert_eq!(q.metrics().pending, 1);
        q.assert_invariants();
    }

    #[test]
    fn test_policy_skip() {
        let q = queue(QueueConfig::default());
        q.policy().admit.store(false, Ordering::SeqCst);
        assert!(!q.maybe_add(replica(1), Instant::now()).unwrap());
        assert!(q.is_empty());
    }

    #[test]
    fn test_uninitialized_replica_is_skipped() {
        let q = queue(QueueConfig::default());
        let uninit = Arc::new(TestReplica {
            id: RangeId(1),
            initialized: false,
            leaseholder: true,
        });
        assert!(!q.maybe_add(uninit, Instant::now()).unwrap());
        assert!(q.is_empty());
    }

    #[test]
    fn test_needs_lease_gates_admission() {
        let q = queue(QueueConfig {
            needs_lease: true,
            ..Default::default()
        });
        let follower = Arc::new(TestReplica {
            id: RangeId(1),
            initialized: true,
            leaseholder: false,
        });
        assert!(!q.maybe_add(follower, Instant::now()).unwrap());
        assert!(q.maybe_add(replica(2), Instant::now()).unwrap());
    }

    #[test]
    fn test_unsplit_ranges_are_skipped() {
        let (tx, rx) = system_config_channel();
        let q = BaseQueue::with_system_config("split", IdPriority::new(), QueueConfig::default(), rx).unwrap();
        assert!(q.maybe_add(replica(1), Instant::now()).unwrap());

        tx.send_replace(Some(Arc::new(SystemConfig::new(vec![b"m".to_vec()]))));
        assert!(!q.maybe_add(replica(2), Instant::now()).unwrap());
    }

    #[test]
    fn test_needs_system_config() {
        let (tx, rx) = system_config_channel();
        let config = QueueConfig {
            needs_system_config: true,
            accepts_unsplit_ranges: true,
            ..Default::default()
        };
        let q = BaseQueue::with_system_config("gc", IdPriority::new(), config, rx).unwrap();
        assert!(!q.maybe_add(replica(1), Instant::now()).unwrap());

        tx.send_replace(Some(Arc::new(SystemConfig::new(vec![b"m".to_vec()]))));
        assert!(q.maybe_add(replica(1), Instant::now()).unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = BaseQueue::new(
            "bad",
            IdPriority::new(),
            QueueConfig {
                max_concurrency: 0,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(QueueError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let q = queue(QueueConfig::default());
        let stopper = CancellationToken::new();
        q.start(&stopper).unwrap();
        assert!(matches!(q.start(&stopper), Err(QueueError::AlreadyStarted { .. })));
        q.stop().await;
        assert!(matches!(q.start(&stopper), Err(QueueError::Stopped { .. })));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_terminal() {
        let q = queue(QueueConfig {
            max_concurrency: 3,
            ..Default::default()
        });
        q.maybe_add(replica(1), Instant::now()).unwrap();
        q.start(&CancellationToken::new()).unwrap();

        q.stop().await;
        q.stop().await;
        assert!(q.is_stopped());
        assert_eq!(q.active_loops(), 0);
        assert!(matches!(
            q.maybe_add(replica(2), Instant::now()),
            Err(QueueError::Stopped { .. })
        ));
        q.remove(RangeId(1));
        assert!(q.is_empty());
        q.assert_invariants();
    }

    #[tokio::test]
    async fn test_stopper_cancels_queue() {
        let q = queue(QueueConfig::default());
        let stopper = CancellationToken::new();
        q.start(&stopper).unwrap();
        stopper.cancel();
        q.stop().await;
        assert_eq!(q.active_loops(), 0);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let q = queue(QueueConfig::default());
        q.maybe_add(replica(1), Instant::now()).unwrap();
        q.stop().await;
        assert!(q.is_empty());
        assert!(q.maybe_add(replica(1), Instant::now()).is_err());
    }

    #[tokio::test]
    async fn test_processes_queued_items() {
        let q = queue(QueueConfig::default());
        for id in 1..=5 {
            q.maybe_add(replica(id), Instant::now()).unwrap();
        }
        q.start(&CancellationToken::new()).unwrap();

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while q.metrics().successes < 5 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
        assert!(drained.is_ok());
        assert!(q.is_empty());
        q.assert_invariants();
        q.stop().await;
    }

    #[tokio::test]
    async fn test_type_erased_handle() {
        let q: Arc<dyn Queue> = Arc::new(queue(QueueConfig::default()));
        assert_eq!(q.name(), "test");
        assert!(q.maybe_add(replica(1), Instant::now()).unwrap());
        assert_eq!(q.len(), 1);
        assert!(!q.is_empty());
        q.remove(RangeId(1));
        assert!(q.is_empty());
        q.check_invariants().unwrap();
        q.stop().await;
    }
}
