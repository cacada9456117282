//! Telemetry for taskpoll.
//!
//! Structured logging through `tracing`, per-request spans, and counters
//! and histograms through the `metrics` facade. Without an installed
//! recorder the metric calls are no-ops.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{record_cycle, record_cycle_failure, record_pending, record_resolution};
pub use spans::{FetchSpan, SpanExt};
