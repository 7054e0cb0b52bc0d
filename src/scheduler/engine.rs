//! The scheduler: admission, immediate execution, and the drain loop.
//!
//! Every submission follows one path:
//!
//! ```text
//! submit ─► cache hit? ──────────────────────────────► CacheHit
//!             │ miss
//!             ▼
//!         policy.route ─► Bypass ─────────────────────► execute now (over ceiling)
//!             │ Immediate + free slot ─────────────────► execute now
//!             ▼ otherwise
//!         AdmissionQueue ─► full ─────────────────────► Rejected
//!             │ admitted (timer armed)
//!             ├─ timer fires while queued ────────────► TimedOut
//!             ▼
//!         drain pass ─► policy.select_batch ─► batch ─► Completed | Failed
//! ```
//!
//! Queue, readiness and metrics are only touched in short synchronous
//! sections; the evaluator call is the only suspension point besides waiting
//! for a batch to finish.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};

use super::dedup::{CacheKey, ResultCache};
use super::entry::{RequestEntry, RequestMeta, Settlement};
use super::policy::{ReadinessState, Route, SchedulingPolicy, SelectionContext};
use super::queue::AdmissionQueue;
use super::slots::{ConcurrencySlots, SlotGuard};
use crate::config::GateConfig;
use crate::error::GateError;
use crate::evaluator::{EvalResult, Evaluator, EvaluatorError};
use crate::telemetry::{
    whole_millis, CacheStats, MetricsRecorder, PerformanceMetrics, RecorderSnapshot, RequestPath,
    RequestSpan, SpanExt,
};

/// Per-submission scheduling hints.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Latency budget. Defaults to `default_max_latency_ms`.
    pub max_latency: Option<Duration>,
    /// Keys that must complete before this request runs (dependency-aware only).
    pub dependencies: Vec<CacheKey>,
    pub critical: bool,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = Some(max_latency);
        self
    }

    pub fn depends_on(mut self, key: CacheKey) -> Self {
        self.dependencies.push(key);
        self
    }

    pub fn dependencies(mut self, keys: impl IntoIterator<Item = CacheKey>) -> Self {
        self.dependencies.extend(keys);
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }
}

struct Inner {
    config: GateConfig,
    evaluator: Arc<dyn Evaluator>,
    policy: Box<dyn SchedulingPolicy>,
    cache: ResultCache,
    queue: AdmissionQueue,
    slots: ConcurrencySlots,
    metrics: MetricsRecorder,
    readiness: RwLock<ReadinessState>,
    draining: AtomicBool,
    next_seq: AtomicU64,
}

/// Admission-controlled, batching front for an `Evaluator`.
///
/// Cheap to clone; clones share all state. Must be used from within a tokio
/// runtime.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &self.inner.policy.name())
            .field("queue", &self.inner.queue)
            .field("slots", &self.inner.slots)
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler using the policy named in `config`.
    pub fn new<E>(config: GateConfig, evaluator: E) -> Self
    where
        E: Evaluator + 'static,
    {
        let policy = config.policy.build(config.adaptive_batch_size);
        Self::with_policy(config, evaluator, policy)
    }

    /// Create a scheduler with a caller-supplied policy.
    pub fn with_policy<E>(config: GateConfig, evaluator: E, policy: Box<dyn SchedulingPolicy>) -> Self
    where
        E: Evaluator + 'static,
    {
        let config = config.sanitized();
        info!(
            policy = policy.name(),
            max_concurrency = config.max_concurrency,
            batch_size = config.batch_size,
            max_queue_size = config.max_queue_size,
            request_timeout_ms = config.request_timeout_ms,
            "scheduler created"
        );
        let inner = Inner {
            queue: AdmissionQueue::new(config.max_queue_size),
            slots: ConcurrencySlots::new(config.max_concurrency),
            evaluator: Arc::new(evaluator),
            policy,
            cache: ResultCache::new(),
            metrics: MetricsRecorder::new(),
            readiness: RwLock::new(ReadinessState::new()),
            draining: AtomicBool::new(false),
            next_seq: AtomicU64::new(1),
            config,
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    pub fn policy_name(&self) -> &'static str {
        self.inner.policy.name()
    }

    /// Submit with default options.
    pub async fn submit(&self, payload: Value, context: Value) -> Result<EvalResult, GateError> {
        self.submit_with(payload, context, SubmitOptions::default()).await
    }

    /// Submit a request and wait for its single terminal outcome.
    pub async fn submit_with(
        &self,
        payload: Value,
        context: Value,
        options: SubmitOptions,
    ) -> Result<EvalResult, GateError> {
        let key = CacheKey::of(&payload);
        let span = RequestSpan::new(&key.short(), self.inner.policy.name());
        let result = Arc::clone(&self.inner)
            .submit(key, payload, context, options)
            .instrument(span.clone())
            .await;
        span.record_result(&result);
        result
    }

    pub fn clear_cache(&self) {
        let dropped = self.inner.cache.len();
        self.inner.cache.clear();
        info!(dropped, "result cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            cache_size: self.inner.cache.len(),
            queue_length: self.inner.queue.len(),
            active_requests: self.inner.slots.active(),
        }
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::assemble(
            &self.inner.metrics.snapshot(),
            self.cache_stats(),
            self.inner.queue.max_size(),
            self.inner.config.max_concurrency,
        )
    }

    /// Raw counters, including the supplemental ones.
    pub fn metrics_snapshot(&self) -> RecorderSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Whether `key` has completed successfully on this scheduler.
    pub fn is_processed(&self, key: &CacheKey) -> bool {
        self.inner.readiness.read().is_processed(key)
    }
}

impl Inner {
    async fn submit(
        self: Arc<Self>,
        key: CacheKey,
        payload: Value,
        context: Value,
        options: SubmitOptions,
    ) -> Result<EvalResult, GateError> {
        if self.config.cache_enabled {
            if let Some(hit) = self.cache.lookup(&key) {
                Span::current().record_path(RequestPath::Cache);
                self.metrics.record_cache_hit();
                self.readiness.write().mark_processed(key);
                return Ok(hit);
            }
        }

        let max_latency = options.max_latency.unwrap_or_else(|| self.config.default_max_latency());
        let meta = RequestMeta::new(key, max_latency)
            .with_dependencies(options.dependencies)
            .with_critical(options.critical)
            .with_seq(self.next_seq.fetch_add(1, Ordering::SeqCst));

        let route = self.policy.route(&meta, &self.readiness.read());
        match route {
            Route::Bypass => {
                Span::current().record_path(RequestPath::Bypass);
                self.metrics.record_bypass();
                let guard = self.slots.acquire_unchecked();
                return self.execute_now(meta.key, payload, context, guard).await;
            }
            Route::Immediate => {
                if let Some(guard) = self.slots.try_acquire() {
                    Span::current().record_path(RequestPath::Immediate);
                    return self.execute_now(meta.key, payload, context, guard).await;
                }
            }
            Route::Queue => {}
        }

        Span::current().record_path(RequestPath::Queued);
        self.enqueue(meta, payload, context).await
    }

    /// Fast path. Runs on its own task so a dropped caller cannot strand the
    /// slot or skip the bookkeeping.
    async fn execute_now(
        self: &Arc<Self>,
        key: CacheKey,
        payload: Value,
        context: Value,
        guard: SlotGuard,
    ) -> Result<EvalResult, GateError> {
        self.metrics.record_admitted();
        let inner = Arc::clone(self);
        let handle = tokio::spawn(
            async move {
                let outcome = inner.evaluator.evaluate(&key, &payload, &context).await;
                drop(guard);
                inner.finish(&key, &outcome);
                inner.kick();
                outcome
            }
            .in_current_span(),
        );

        match handle.await {
            Ok(outcome) => outcome.map_err(GateError::Execution),
            Err(e) => {
                warn!(error = %e, "evaluator task failed");
                self.metrics.record_processed(false);
                self.kick();
                Err(GateError::Abandoned)
            }
        }
    }

    async fn enqueue(
        self: &Arc<Self>,
        meta: RequestMeta,
        payload: Value,
        context: Value,
    ) -> Result<EvalResult, GateError> {
        let (settlement, rx) = Settlement::channel();
        let enqueued_at = meta.enqueued_at;
        let entry = RequestEntry::new(
            meta.seq,
            meta,
            payload,
            context,
            self.config.request_timeout(),
            settlement,
        );

        let weak = Arc::downgrade(self);
        let admitted = self
            .queue
            .try_admit(entry, &self.metrics, |e| spawn_timer(weak, e.id, e.deadline));
        match admitted {
            Ok(position) => debug!(position, "request queued"),
            Err(err) => {
                warn!(error = %err, "admission rejected");
                return Err(err);
            }
        }

        self.kick();
        let outcome = rx.await.unwrap_or(Err(GateError::Abandoned));
        Span::current().record_wait(enqueued_at.elapsed());
        outcome
    }

    /// Timer path: time out the entry if it is still queued.
    fn expire(&self, id: u64) {
        // Once removed here the entry can no longer be dequeued, so the
        // timeout is the only possible settlement.
        let Some((entry, position)) = self.queue.remove_expired(id) else {
            return;
        };

        let wait_ms = whole_millis(entry.wait_time());
        self.metrics.record_timeout();
        self.metrics.record_queue_depth(self.queue.len());
        warn!(key = %entry.key().short(), wait_ms, position, "request timed out in queue");
        entry.settle(Err(GateError::RequestTimeout {
            configured_timeout_ms: self.config.request_timeout_ms,
            wait_time_ms: wait_ms,
            queue_position: position,
        }));
    }

    /// Shared completion bookkeeping for every executed attempt.
    fn finish(&self, key: &CacheKey, outcome: &Result<EvalResult, EvaluatorError>) {
        match outcome {
            Ok(result) => {
                if self.config.cache_enabled {
                    self.cache.store(*key, result.clone());
                }
                self.readiness.write().mark_processed(*key);
                self.metrics.record_processed(true);
            }
            Err(e) => {
                debug!(key = %key.short(), error = %e, "evaluation failed");
                self.metrics.record_processed(false);
            }
        }
    }

    /// Start a drain pass unless one is running or there is nothing to do.
    fn kick(self: &Arc<Self>) {
        if self.draining.load(Ordering::SeqCst)
            || self.queue.is_empty()
            || !self.slots.has_headroom()
        {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drain().await });
    }

    async fn drain(self: Arc<Self>) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }

            while let Some(batch) = self.next_batch() {
                self.run_batch(batch).await;
            }

            self.draining.store(false, Ordering::SeqCst);
            // Completions that arrived while the flag was held skipped their
            // kick; pick up their work here.
            if !self.has_ready_work() {
                return;
            }
        }
    }

    fn selection_context<'a>(&self, readiness: &'a ReadinessState) -> SelectionContext<'a> {
        SelectionContext {
            batch_size: self.config.batch_size,
            headroom: self.slots.headroom(),
            now: Instant::now(),
            readiness,
        }
    }

    fn next_batch(&self) -> Option<Vec<RequestEntry>> {
        if !self.slots.has_headroom() {
            return None;
        }
        let readiness = self.readiness.read();
        let ctx = self.selection_context(&readiness);
        let batch = self.queue.take_batch(|metas| self.policy.select_batch(metas, &ctx));
        drop(readiness);
        (!batch.is_empty()).then_some(batch)
    }

    fn has_ready_work(&self) -> bool {
        if !self.slots.has_headroom() || self.queue.is_empty() {
            return false;
        }
        let readiness = self.readiness.read();
        let ctx = self.selection_context(&readiness);
        self.queue.would_select(|metas| self.policy.select_batch(metas, &ctx))
    }

    async fn run_batch(self: &Arc<Self>, batch: Vec<RequestEntry>) {
        self.metrics.record_batch(batch.len());
        self.metrics.record_queue_depth(self.queue.len());
        debug!(size = batch.len(), policy = self.policy.name(), "dispatching batch");

        let handles: Vec<_> = batch
            .into_iter()
            .map(|entry| {
                let guard = self.slots.acquire_unchecked();
                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.execute_queued(entry, guard).await })
            })
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!(error = %e, "batch member task failed");
                self.metrics.record_processed(false);
            }
        }
    }

    async fn execute_queued(&self, mut entry: RequestEntry, guard: SlotGuard) {
        entry.disarm();
        let wait = entry.wait_time();
        self.metrics.record_wait(wait);

        let cached = if self.config.cache_enabled {
            self.cache.lookup(entry.key())
        } else {
            None
        };
        let outcome = match cached {
            Some(hit) => {
                debug!(key = %entry.key().short(), "cache filled while queued");
                self.metrics.record_cache_hit();
                Ok(hit)
            }
            None => {
                self.evaluator
                    .evaluate(entry.key(), &entry.payload, &entry.context)
                    .await
            }
        };
        drop(guard);

        // A timeout that already won keeps its result; nothing is counted twice.
        let Some(tx) = entry.settlement.claim() else {
            debug!(key = %entry.key().short(), "discarding completion for settled request");
            return;
        };
        self.finish(entry.key(), &outcome);
        debug!(
            key = %entry.key().short(),
            wait_ms = whole_millis(wait),
            ok = outcome.is_ok(),
            "queued request finished"
        );
        let _ = tx.send(outcome.map_err(GateError::Execution));
    }
}

fn spawn_timer(inner: Weak<Inner>, id: u64, deadline: Instant) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        if let Some(inner) = inner.upgrade() {
            inner.expire(id);
        }
    })
    .abort_handle()
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
