//! Scheduler metrics recording.
//!
//! `MetricsRecorder` keeps the counters behind `get_performance_metrics` and
//! mirrors every update to the `metrics` crate facade. Recording never fails:
//! a bookkeeping fault is logged and the update is dropped.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::MetricsError;

/// Number of wait-time samples kept for the running mean.
pub const WAIT_WINDOW: usize = 100;

#[derive(Debug, Default)]
struct RecorderState {
    total_queued: u64,
    total_processed: u64,
    timeouts: u64,
    rejections: u64,
    cache_hits: u64,
    failures: u64,
    bypassed: u64,
    batches_dispatched: u64,
    wait_samples: VecDeque<f64>,
    wait_mean: f64,
}

fn bump(counter: &mut u64, name: &'static str) -> Result<(), MetricsError> {
    *counter = counter.checked_add(1).ok_or(MetricsError::CounterOverflow(name))?;
    Ok(())
}

impl RecorderState {
    /// Slide the window and update the mean from one consistent view of
    /// (count, previous mean, new sample).
    fn push_wait(&mut self, sample_ms: f64) -> Result<(), MetricsError> {
        if !sample_ms.is_finite() || sample_ms < 0.0 {
            return Err(MetricsError::InvalidSample(sample_ms));
        }
        if self.wait_samples.len() == WAIT_WINDOW {
            let evicted = self.wait_samples.pop_front().unwrap_or(self.wait_mean);
            self.wait_samples.push_back(sample_ms);
            self.wait_mean += (sample_ms - evicted) / WAIT_WINDOW as f64;
        } else {
            self.wait_samples.push_back(sample_ms);
            let n = self.wait_samples.len() as f64;
            self.wait_mean += (sample_ms - self.wait_mean) / n;
        }
        Ok(())
    }
}

/// Point-in-time copy of the recorder counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderSnapshot {
    pub total_queued: u64,
    pub total_processed: u64,
    pub timeouts: u64,
    pub rejections: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub bypassed: u64,
    pub batches_dispatched: u64,
    pub average_wait_ms: f64,
    pub wait_samples: usize,
}

impl RecorderSnapshot {
    /// Timeouts over everything that entered the pipeline.
    pub fn timeout_rate(&self) -> f64 {
        ratio(self.timeouts, self.total_queued)
    }

    /// Rejections over everything that asked for admission.
    pub fn rejection_rate(&self) -> f64 {
        ratio(self.rejections, self.total_queued + self.rejections)
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Best-effort, non-failing metrics recorder.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    state: Mutex<RecorderState>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply<F>(&self, op: &'static str, update: F)
    where
        F: FnOnce(&mut RecorderState) -> Result<(), MetricsError>,
    {
        let mut state = self.state.lock();
        if let Err(e) = update(&mut state) {
            tracing::warn!(op, error = %e, "metrics update dropped");
        }
    }

    /// A request entered the execution pipeline (immediate, bypass or queue).
    pub fn record_admitted(&self) {
        self.apply("admitted", |s| bump(&mut s.total_queued, "total_queued"));
        metrics::counter!("evalgate_requests_admitted_total").increment(1);
    }

    /// A request was refused because the queue was full.
    pub fn record_rejected(&self) {
        self.apply("rejected", |s| bump(&mut s.rejections, "rejections"));
        metrics::counter!("evalgate_requests_rejected_total").increment(1);
    }

    /// An evaluator attempt finished, successfully or not.
    pub fn record_processed(&self, success: bool) {
        self.apply("processed", |s| {
            bump(&mut s.total_processed, "total_processed")?;
            if !success {
                bump(&mut s.failures, "failures")?;
            }
            Ok(())
        });
        metrics::counter!("evalgate_requests_processed_total").increment(1);
        if !success {
            metrics::counter!("evalgate_requests_failed_total").increment(1);
        }
    }

    /// A queued request hit its deadline before being dequeued.
    pub fn record_timeout(&self) {
        self.apply("timeout", |s| bump(&mut s.timeouts, "timeouts"));
        metrics::counter!("evalgate_requests_timed_out_total").increment(1);
    }

    /// Time a queued request waited before execution.
    pub fn record_wait(&self, wait: Duration) {
        let ms = wait.as_secs_f64() * 1000.0;
        self.record_wait_ms(ms);
    }

    pub fn record_wait_ms(&self, ms: f64) {
        self.apply("wait", |s| s.push_wait(ms));
        metrics::histogram!("evalgate_wait_ms").record(ms);
    }

    pub fn record_cache_hit(&self) {
        self.apply("cache_hit", |s| bump(&mut s.cache_hits, "cache_hits"));
        metrics::counter!("evalgate_cache_hits_total").increment(1);
    }

    /// A latency-critical request skipped the ceiling.
    pub fn record_bypass(&self) {
        self.apply("bypass", |s| bump(&mut s.bypassed, "bypassed"));
        metrics::counter!("evalgate_requests_bypassed_total").increment(1);
    }

    pub fn record_batch(&self, size: usize) {
        self.apply("batch", |s| bump(&mut s.batches_dispatched, "batches_dispatched"));
        metrics::histogram!("evalgate_batch_size").record(size as f64);
    }

    pub fn record_queue_depth(&self, depth: usize) {
        metrics::gauge!("evalgate_queue_depth").set(depth as f64);
    }

    pub fn snapshot(&self) -> RecorderSnapshot {
        let state = self.state.lock();
        RecorderSnapshot {
            total_queued: state.total_queued,
            total_processed: state.total_processed,
            timeouts: state.timeouts,
            rejections: state.rejections,
            cache_hits: state.cache_hits,
            failures: state.failures,
            bypassed: state.bypassed,
            batches_dispatched: state.batches_dispatched,
            average_wait_ms: state.wait_mean,
            wait_samples: state.wait_samples.len(),
        }
    }
}

/// Cache occupancy and scheduler load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub cache_size: usize,
    pub queue_length: usize,
    pub active_requests: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    pub current_length: usize,
    pub max_size: usize,
    pub rejections: u64,
    pub total_queued: u64,
    pub total_processed: u64,
    /// Mean over the last `WAIT_WINDOW` samples, in milliseconds.
    pub average_wait_time: f64,
    pub timeouts: u64,
    pub timeout_rate: f64,
    pub rejection_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyMetrics {
    pub active: usize,
    pub max: usize,
    pub utilization: f64,
}

/// Full operational view exported by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub queue: QueueMetrics,
    pub concurrency: ConcurrencyMetrics,
    pub cache: CacheStats,
}

impl PerformanceMetrics {
    pub fn assemble(
        recorded: &RecorderSnapshot,
        cache: CacheStats,
        max_queue_size: usize,
        max_concurrency: usize,
    ) -> Self {
        let queue = QueueMetrics {
            current_length: cache.queue_length,
            max_size: max_queue_size,
            rejections: recorded.rejections,
            total_queued: recorded.total_queued,
            total_processed: recorded.total_processed,
            average_wait_time: recorded.average_wait_ms,
            timeouts: recorded.timeouts,
            timeout_rate: recorded.timeout_rate(),
            rejection_rate: recorded.rejection_rate(),
        };
        let utilization = if max_concurrency == 0 {
            0.0
        } else {
            cache.active_requests as f64 / max_concurrency as f64
        };
        let concurrency = ConcurrencyMetrics {
            active: cache.active_requests,
            max: max_concurrency,
            utilization,
        };
        Self { queue, concurrency, cache }
    }
}
