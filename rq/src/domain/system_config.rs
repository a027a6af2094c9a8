//! Cluster-wide configuration snapshot consulted by queues

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::range::RangeDescriptor;

/// Receiving side of the system config feed. `None` until the first config
/// has been observed.
pub type SystemConfigReceiver = watch::Receiver<Option<Arc<SystemConfig>>>;

/// Sending side of the system config feed
pub type SystemConfigSender = watch::Sender<Option<Arc<SystemConfig>>>;

/// Create a system config feed with no config published yet
pub fn system_config_channel() -> (SystemConfigSender, SystemConfigReceiver) {
    watch::channel(None)
}

/// Snapshot of the cluster configuration. Queues treat it as opaque except for
/// the split points, which decide whether a range may be processed unsplit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Sorted, deduplicated keys at which ranges must be split
    #[serde(rename = "split-keys")]
    split_keys: Vec<Vec<u8>>,
}

impl SystemConfig {
    pub fn new(split_keys: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let mut split_keys: Vec<Vec<u8>> = split_keys.into_iter().collect();
        split_keys.sort();
        split_keys.dedup();
        Self { split_keys }
    }

    pub fn split_keys(&self) -> &[Vec<u8>] {
        &self.split_keys
    }

    /// First required split point strictly inside the range, if any
    pub fn split_key(&self, desc: &RangeDescriptor) -> Option<&[u8]> {
        let idx = self
            .split_keys
            .partition_point(|key| key.as_slice() <= desc.start_key.as_slice());
        self.split_keys
            .get(idx)
            .map(Vec::as_slice)
            .filter(|key| desc.strictly_contains(key))
    }

    /// True if the range spans a required split point
    pub fn needs_split(&self, desc: &RangeDescriptor) -> bool {
        self.split_key(desc).is_some()
    }
}
