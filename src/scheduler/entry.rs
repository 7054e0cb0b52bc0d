//! Queued request type and its settlement handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::dedup::CacheKey;
use crate::error::GateError;
use crate::evaluator::EvalResult;

/// Outcome delivered to the submitter.
pub type Outcome = Result<EvalResult, GateError>;
/// Response channel type for delivering results back to callers.
pub type ResponseTx = oneshot::Sender<Outcome>;
/// Receiver half for awaiting results.
pub type ResponseRx = oneshot::Receiver<Outcome>;

/// Scheduling-relevant description of a request.
///
/// This is all a `SchedulingPolicy` sees; payload and context stay opaque.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub key: CacheKey,
    /// Declared latency budget.
    pub max_latency: Duration,
    /// Keys that must complete successfully before this request may run.
    pub dependencies: Vec<CacheKey>,
    pub critical: bool,
    /// Arrival sequence number, used as the stable tie-break.
    pub seq: u64,
    pub enqueued_at: Instant,
}

impl RequestMeta {
    pub fn new(key: CacheKey, max_latency: Duration) -> Self {
        Self {
            key,
            max_latency,
            dependencies: Vec::new(),
            critical: false,
            seq: 0,
            enqueued_at: Instant::now(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<CacheKey>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_enqueued_at(mut self, enqueued_at: Instant) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }
}

/// First-writer-wins settlement for one caller.
///
/// Completion and timeout both race to `claim`; only the winner gets the
/// response channel, so the caller is resolved at most once.
pub struct Settlement {
    settled: AtomicBool,
    tx: Mutex<Option<ResponseTx>>,
}

impl Settlement {
    pub fn new(tx: ResponseTx) -> Self {
        Self { settled: AtomicBool::new(false), tx: Mutex::new(Some(tx)) }
    }

    /// Create a settlement paired with its receiver.
    pub fn channel() -> (Self, ResponseRx) {
        let (tx, rx) = oneshot::channel();
        (Self::new(tx), rx)
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Claim the right to settle. Returns the channel to the winner only.
    pub fn claim(&self) -> Option<ResponseTx> {
        self.settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.tx.lock().take()
    }
}

impl std::fmt::Debug for Settlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settlement").field("settled", &self.is_settled()).finish()
    }
}

/// A request waiting in the admission queue.
pub struct RequestEntry {
    pub id: u64,
    pub meta: RequestMeta,
    pub payload: Value,
    pub context: Value,
    pub deadline: Instant,
    pub settlement: Settlement,
    timer: Option<AbortHandle>,
}

impl std::fmt::Debug for RequestEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEntry")
            .field("id", &self.id)
            .field("key", &self.meta.key)
            .field("settled", &self.settlement.is_settled())
            .finish()
    }
}

impl RequestEntry {
    pub fn new(
        id: u64,
        meta: RequestMeta,
        payload: Value,
        context: Value,
        timeout: Duration,
        settlement: Settlement,
    ) -> Self {
        let deadline = meta.enqueued_at + timeout;
        Self { id, meta, payload, context, deadline, settlement, timer: None }
    }

    pub fn key(&self) -> &CacheKey {
        &self.meta.key
    }

    /// Time spent waiting since admission.
    pub fn wait_time(&self) -> Duration {
        self.meta.enqueued_at.elapsed()
    }

    pub(crate) fn arm(&mut self, timer: AbortHandle) {
        self.timer = Some(timer);
    }

    /// Cancel the timeout timer. Called by whoever takes the entry out of
    /// the queue for execution.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Settle with the given outcome if nobody else has. Returns true if
    /// this call delivered the outcome.
    pub fn settle(&self, outcome: Outcome) -> bool {
        match self.settlement.claim() {
            Some(tx) => {
                // A dropped receiver means the caller went away; still settled.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

impl Drop for RequestEntry {
    fn drop(&mut self) {
        self.disarm();
    }
}
