//! Resolve-path timing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Time spent resolving providers for one want, split into waiting on the
/// network and everything else.
#[derive(Debug, Default)]
pub struct ResolveTracker {
    communication_nanos: AtomicU64,
    scheduling_nanos: AtomicU64,
}

impl ResolveTracker {
    /// Add time spent waiting on remote responses.
    pub fn add_communication(&self, elapsed: Duration) {
        self.communication_nanos
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
    }

    /// Add time spent on local work between responses.
    pub fn add_scheduling(&self, elapsed: Duration) {
        self.scheduling_nanos
            .fetch_add(saturating_nanos(elapsed), Ordering::Relaxed);
    }

    /// `(communication, scheduling)` totals.
    pub fn collect(&self) -> (Duration, Duration) {
        (
            Duration::from_nanos(self.communication_nanos.load(Ordering::Relaxed)),
            Duration::from_nanos(self.scheduling_nanos.load(Ordering::Relaxed)),
        )
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates() {
        let resolver = ResolveTracker::default();
        resolver.add_communication(Duration::from_millis(5));
        resolver.add_communication(Duration::from_millis(7));
        resolver.add_scheduling(Duration::from_micros(300));

        assert_eq!(
            resolver.collect(),
            (Duration::from_millis(12), Duration::from_micros(300))
        );
    }
}
