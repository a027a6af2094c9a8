//! Periodic driver that offers every hosted replica to every queue

mod config;
mod replica_scanner;

pub use config::ScannerConfig;
pub use replica_scanner::{ReplicaScanner, ReplicaSource, ScanReport, ScannerStats};
