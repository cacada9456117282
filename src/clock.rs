//! Time source abstraction so deadline math can be driven by tests.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Start at a fixed instant (2016-03-07T05:00:00Z).
    pub fn fixed() -> Self {
        let start = DateTime::<Utc>::from_timestamp_millis(1_457_326_800_000)
            .unwrap_or_default();
        Self::new(start)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn advance_millis(&self, millis: i64) {
        self.advance(Duration::milliseconds(millis));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::fixed();
        let start = clock.now();
        clock.advance_millis(1500);
        assert_eq!((clock.now() - start).num_milliseconds(), 1500);
    }

    #[test]
    fn manual_clock_set_overrides() {
        let clock = ManualClock::fixed();
        let later = clock.now() + Duration::seconds(60);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
