//! Span helpers for fetch requests.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for fetch request spans.
pub struct FetchSpan;

impl FetchSpan {
    /// `request_id` is filled in once the request is admitted; `status`
    /// and `error.message` by [`SpanExt::record_result`].
    pub fn new(worker_id: &str, engine: &str) -> Span {
        info_span!(
            "fetch_request",
            worker_id = %worker_id,
            engine = %engine,
            request_id = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_result_accepts_both_outcomes() {
        let span = FetchSpan::new("worker-1", "default");
        span.record_result::<(), &str>(&Ok(()));
        span.record_result::<(), &str>(&Err("engine unavailable"));
    }
}
