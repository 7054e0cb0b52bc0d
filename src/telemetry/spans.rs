//! The `eval_request` span and helpers for filling in its fields.

use std::time::Duration;

use tracing::{field, info_span, Span};

/// Route a request took through the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPath {
    Cache,
    Immediate,
    Bypass,
    Queued,
}

impl RequestPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Immediate => "immediate",
            Self::Bypass => "bypass",
            Self::Queued => "queued",
        }
    }
}

/// Field recorders for request spans.
pub trait SpanExt {
    /// `status` is `ok` or `error`; errors also fill `error.message`.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;

    fn record_path(&self, path: RequestPath);

    fn record_wait(&self, wait: Duration);
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

    fn record_path(&self, path: RequestPath) {
        self.record("path", path.as_str());
    }

    fn record_wait(&self, wait: Duration) {
        self.record("wait_ms", whole_millis(wait));
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
pub fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub struct RequestSpan;

impl RequestSpan {
    /// Open an `eval_request` span.
    ///
    /// `path`, `status`, `error.message` and `wait_ms` start empty and are
    /// filled in through `SpanExt` as the request progresses. `wait_ms` is
    /// only set for queued requests.
    pub fn new(key: &str, policy: &str) -> Span {
        info_span!(
            "eval_request",
            key = %key,
            policy = %policy,
            path = field::Empty,
            status = field::Empty,
            error.message = field::Empty,
            wait_ms = field::Empty,
        )
    }
}
