//! Sleep computation between dispatch cycles.

use std::time::Duration;

/// Idle wait: effectively forever, but still interruptible by a signal.
pub const MAX_BACK_OFF: Duration = Duration::from_millis(u64::MAX);

/// Wait after a cycle that panicked, capped by the fetch interval.
pub const FAILED_CYCLE_BACK_OFF: Duration = Duration::from_millis(500);

/// Tracks the smallest remaining deadline seen during a cycle.
#[derive(Debug, Clone, Copy)]
pub struct BackOff {
    millis: u64,
}

impl BackOff {
    pub fn new() -> Self {
        Self { millis: u64::MAX }
    }

    /// Fold in one request's remaining time.
    pub fn observe(&mut self, remaining_ms: i64) {
        let remaining = u64::try_from(remaining_ms.max(0)).unwrap_or(0);
        self.millis = self.millis.min(remaining);
    }

    /// Wait before the next cycle.
    ///
    /// With nothing pending this is [`MAX_BACK_OFF`]. Otherwise the wait
    /// never exceeds `fetch_interval`, so distant deadlines still get
    /// re-polled for newly available tasks.
    pub fn next_wait(self, has_pending: bool, fetch_interval: Duration) -> Duration {
        let wait = Duration::from_millis(self.millis);
        if has_pending {
            wait.min(fetch_interval)
        } else {
            wait
        }
    }
}

impl Default for BackOff {
    fn default() -> Self {
        Self::new()
    }
}
