//! Metric names and recording helpers.

use std::time::Duration;

pub const RESOLUTIONS_TOTAL: &str = "taskpoll_resolutions_total";
pub const CYCLE_FAILURES_TOTAL: &str = "taskpoll_cycle_failures_total";
pub const PENDING_REQUESTS: &str = "taskpoll_pending_requests";
pub const CYCLE_DURATION_MS: &str = "taskpoll_cycle_duration_ms";

/// Count one request outcome (`locked`, `timeout`, `error`, `cancelled`,
/// `shutdown`, `rejected_capacity`, `rejected_validation`), or `orphaned`
/// for tasks locked on behalf of a request that was already gone.
pub fn record_resolution(outcome: &'static str) {
    ::metrics::counter!(RESOLUTIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_pending(count: usize) {
    ::metrics::gauge!(PENDING_REQUESTS).set(count as f64);
}

pub fn record_cycle(elapsed: Duration) {
    ::metrics::histogram!(CYCLE_DURATION_MS).record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_cycle_failure() {
    ::metrics::counter!(CYCLE_FAILURES_TOTAL).increment(1);
}
