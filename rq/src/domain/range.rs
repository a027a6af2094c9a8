//! Range identifiers, descriptors and the replica interface consumed by queues

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Stable identifier of a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RangeId(pub i64);

impl std::fmt::Display for RangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl From<i64> for RangeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of the store hosting a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(pub i32);

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Key span covered by a range. An empty `end_key` means the span is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub range_id: RangeId,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

impl RangeDescriptor {
    pub fn new(range_id: RangeId, start_key: impl Into<Vec<u8>>, end_key: impl Into<Vec<u8>>) -> Self {
        Self {
            range_id,
            start_key: start_key.into(),
            end_key: end_key.into(),
        }
    }

    /// True if `key` lies strictly inside the span, i.e. splitting at it would
    /// produce two non-empty ranges
    pub fn strictly_contains(&self, key: &[u8]) -> bool {
        key > self.start_key.as_slice() && (self.end_key.is_empty() || key < self.end_key.as_slice())
    }
}

/// Why a replica is (or is not) destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestroyReason {
    #[default]
    Alive,
    RemovalPending,
    Removed,
}

impl DestroyReason {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Alive)
    }
}

impl std::fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => write!(f, "alive"),
            Self::RemovalPending => write!(f, "removal-pending"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// Lease state of a replica as observed at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    /// A valid lease held by the given store
    Valid { holder: StoreId },
    /// The last known lease has expired
    Expired,
    /// No lease information is available
    Unknown,
}

impl LeaseStatus {
    /// True if the lease is valid and held by `store_id`
    pub fn owned_by(&self, store_id: StoreId) -> bool {
        matches!(self, Self::Valid { holder } if *holder == store_id)
    }
}

/// A range replica as seen by the maintenance queues.
///
/// Queues only read status through this trait and hand the replica to their
/// processing policy; they never mutate it.
pub trait Replica: Send + Sync {
    /// Stable range identifier
    fn range_id(&self) -> RangeId;

    /// Store that hosts this replica
    fn store_id(&self) -> StoreId;

    /// False until the replica has received its initial state
    fn is_initialized(&self) -> bool;

    /// Current destruction status
    fn destroy_status(&self) -> DestroyReason;

    /// Current range descriptor
    fn desc(&self) -> RangeDescriptor;

    /// Lease state at `now`
    fn lease_status(&self, now: Instant) -> LeaseStatus;
}
