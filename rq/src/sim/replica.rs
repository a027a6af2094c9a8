//! Synthetic replicas

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Instant;

use crate::domain::{DestroyReason, LeaseStatus, RangeDescriptor, RangeId, Replica, StoreId};

const NO_LEASE: i32 = -1;

/// An in-memory replica whose status can be flipped from tests and the
/// simulation driver
#[derive(Debug)]
pub struct SimReplica {
    range_id: RangeId,
    store_id: StoreId,
    desc: RangeDescriptor,
    initialized: AtomicBool,
    destroyed: AtomicBool,
    lease_holder: AtomicI32,
}

impl SimReplica {
    /// An initialized, alive replica holding its own lease. Its span is
    /// `[id, id+1)` in zero-padded decimal.
    pub fn new(range_id: RangeId, store_id: StoreId) -> Self {
        let desc = RangeDescriptor::new(
            range_id,
            format!("{:012}", range_id.0).into_bytes(),
            format!("{:012}", range_id.0 + 1).into_bytes(),
        );
        Self::with_desc(store_id, desc)
    }

    pub fn with_desc(store_id: StoreId, desc: RangeDescriptor) -> Self {
        Self {
            range_id: desc.range_id,
            store_id,
            desc,
            initialized: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
            lease_holder: AtomicI32::new(store_id.0),
        }
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    /// Mark the replica as pending removal
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    /// Move the lease to `holder`, or drop it
    pub fn set_lease(&self, holder: Option<StoreId>) {
        self.lease_holder
            .store(holder.map_or(NO_LEASE, |store| store.0), Ordering::SeqCst);
    }
}

impl Replica for SimReplica {
    fn range_id(&self) -> RangeId {
        self.range_id
    }

    fn store_id(&self) -> StoreId {
        self.store_id
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn destroy_status(&self) -> DestroyReason {
        if self.destroyed.load(Ordering::SeqCst) {
            DestroyReason::RemovalPending
        } else {
            DestroyReason::Alive
        }
    }

    fn desc(&self) -> RangeDescriptor {
        self.desc.clone()
    }

    fn lease_status(&self, _now: Instant) -> LeaseStatus {
        match self.lease_holder.load(Ordering::SeqCst) {
            NO_LEASE => LeaseStatus::Expired,
            holder => LeaseStatus::Valid {
                holder: StoreId(holder),
            },
        }
    }
}
