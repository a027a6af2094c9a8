//! Pluggable per-task queue behavior

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::{Replica, SystemConfig};

use super::error::ProcessError;

/// How often the default purgatory wake signal fires
pub const DEFAULT_PURGATORY_INTERVAL: Duration = Duration::from_secs(60);

/// Admission decision for a candidate replica
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Leave the replica alone
    Skip,
    /// Queue the replica; higher priority is processed sooner
    Queue { priority: f64 },
}

impl Admission {
    pub fn queue(priority: f64) -> Self {
        Self::Queue { priority }
    }

    /// Build a decision from the `(should_queue, priority)` pair most policies compute
    pub fn from_decision(should_queue: bool, priority: f64) -> Self {
        if should_queue { Self::Queue { priority } } else { Self::Skip }
    }
}

/// The capabilities that make a queue a split queue, a GC queue, and so on.
///
/// The queue core is generic over one value implementing this trait and never
/// interprets what `process` does.
#[async_trait]
pub trait QueuePolicy: Send + Sync + 'static {
    /// Decide whether `replica` should be queued and at which priority
    fn should_queue(&self, now: Instant, replica: &dyn Replica, system_config: Option<&SystemConfig>) -> Admission;

    /// Run the maintenance operation. Runs outside the queue lock and is
    /// cancelled by dropping the future (timeout or shutdown).
    async fn process(
        &self,
        replica: Arc<dyn Replica>,
        system_config: Option<Arc<SystemConfig>>,
    ) -> Result<(), ProcessError>;

    /// Delay before retry number `attempt` (1-based) after a regular error
    fn timer(&self, attempt: u32) -> Duration;

    /// Resolve when quarantined items should be retried together
    async fn purgatory_wake(&self) {
        tokio::time::sleep(DEFAULT_PURGATORY_INTERVAL).await;
    }
}

/// Capped exponential backoff: `base * 2^(attempt - 1)`, never above `max`
pub fn exponential_backoff(base: Duration, max: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << shift).map_or(max, |delay| delay.min(max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_from_decision() {
        assert_eq!(Admission::from_decision(false, 3.0), Admission::Skip);
        assert_eq!(Admission::from_decision(true, 3.0), Admission::queue(3.0));
    }

    #[test]
    fn test_exponential_backoff() {
        let base = Duration::from_millis(10);
        let max = Duration::from_secs(1);
        assert_eq!(exponential_backoff(base, max, 0), base);
        assert_eq!(exponential_backoff(base, max, 1), base);
        assert_eq!(exponential_backoff(base, max, 2), Duration::from_millis(20));
        assert_eq!(exponential_backoff(base, max, 4), Duration::from_millis(80));
        assert_eq!(exponential_backoff(base, max, 20), max);
        assert_eq!(exponential_backoff(base, max, u32::MAX), max);
    }
}
