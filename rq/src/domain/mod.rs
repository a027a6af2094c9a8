//! Domain types shared by queues, the scanner and the store
//!
//! Ranges are opaque collaborators: queues read their identity and status
//! through the [`Replica`] trait and never mutate them.

mod range;
mod system_config;

pub use range::{DestroyReason, LeaseStatus, RangeDescriptor, RangeId, Replica, StoreId};
pub use system_config::{SystemConfig, SystemConfigReceiver, SystemConfigSender, system_config_channel};
