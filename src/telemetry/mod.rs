//! Telemetry module for evalgate.
//!
//! Provides structured logging, request spans, and scheduler metrics.

mod logging;
mod metrics;
mod spans;

pub use self::logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    CacheStats, ConcurrencyMetrics, MetricsRecorder, PerformanceMetrics, QueueMetrics,
    RecorderSnapshot, WAIT_WINDOW,
};
pub use self::spans::{whole_millis, RequestPath, RequestSpan, SpanExt};
