//! Ordered priority index with O(log n) lookup by range id

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::domain::RangeId;

/// Position of an item in the priority order
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueueKey {
    pub priority: f64,
    /// Arrival sequence, lower arrived earlier
    pub seq: u64,
}

impl Eq for QueueKey {}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier arrival
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Items ordered by [`QueueKey`]; the greatest key is served next and the
/// least key is the eviction candidate.
#[derive(Debug, Default)]
pub(crate) struct PriorityIndex {
    ordered: BTreeMap<QueueKey, RangeId>,
    keys: HashMap<RangeId, QueueKey>,
}

impl PriorityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains(&self, range_id: RangeId) -> bool {
        self.keys.contains_key(&range_id)
    }

    #[cfg(test)]
    pub fn key(&self, range_id: RangeId) -> Option<QueueKey> {
        self.keys.get(&range_id).copied()
    }

    /// Insert or reposition an item
    pub fn insert(&mut self, range_id: RangeId, key: QueueKey) {
        if let Some(old) = self.keys.insert(range_id, key) {
            self.ordered.remove(&old);
        }
        self.ordered.insert(key, range_id);
    }

    /// Change an item's priority, keeping its arrival sequence
    pub fn update_priority(&mut self, range_id: RangeId, priority: f64) -> bool {
        let Some(old) = self.keys.get(&range_id).copied() else {
            return false;
        };
        self.insert(range_id, QueueKey { priority, ..old });
        true
    }

    pub fn remove(&mut self, range_id: RangeId) -> Option<QueueKey> {
        let key = self.keys.remove(&range_id)?;
        self.ordered.remove(&key);
        Some(key)
    }

    /// Remove and return the next item to serve
    pub fn pop_max(&mut self) -> Option<(RangeId, QueueKey)> {
        let (key, range_id) = self.ordered.pop_last()?;
        self.keys.remove(&range_id);
        Some((range_id, key))
    }

    /// The item that would be evicted first
    pub fn peek_min(&self) -> Option<(RangeId, QueueKey)> {
        self.ordered.first_key_value().map(|(key, range_id)| (*range_id, *key))
    }

    pub fn ids(&self) -> impl Iterator<Item = RangeId> + '_ {
        self.ordered.values().copied()
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.keys.clear();
    }

    /// True if both views agree on membership and keys
    pub fn is_consistent(&self) -> bool {
        self.ordered.len() == self.keys.len()
            && self
                .ordered
                .iter()
                .all(|(key, range_id)| self.keys.get(range_id) == Some(key))
    }
}
