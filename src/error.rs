//! Error types for the evalgate scheduler.
//!
//! Admission and timeout errors are synthesized here with structured context.
//! Evaluator failures pass through untouched inside `GateError::Execution`.

use thiserror::Error;

use crate::evaluator::EvaluatorError;

/// Terminal error delivered to a caller of `Scheduler::submit`.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Admission rejected: queue full ({queue_size}/{max_queue_size} pending requests)")]
    AdmissionRejected {
        queue_size: usize,
        max_queue_size: usize,
    },

    #[error(
        "Request timed out after {wait_time_ms}ms in queue \
         (timeout {configured_timeout_ms}ms, position {queue_position})"
    )]
    RequestTimeout {
        configured_timeout_ms: u64,
        wait_time_ms: u64,
        queue_position: usize,
    },

    #[error(transparent)]
    Execution(#[from] EvaluatorError),

    #[error("Request abandoned before settlement")]
    Abandoned,
}

impl GateError {
    /// Returns true for admission- and timeout-class errors.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::AdmissionRejected { .. } | Self::RequestTimeout { .. })
    }

    /// Returns true if the error came from the evaluator itself.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }
}

/// Internal bookkeeping fault. Logged by the recorder, never surfaced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Invalid wait-time sample: {0}")]
    InvalidSample(f64),

    #[error("Counter overflow: {0}")]
    CounterOverflow(&'static str),
}
