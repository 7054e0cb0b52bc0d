//! Pluggable batch selection for the drain loop.
//!
//! A `SchedulingPolicy` decides two things: how a fresh submission is routed
//! (`route`) and which queued requests form the next batch (`select_batch`).
//! Policies only ever see `RequestMeta`; they never mutate the queue.

mod dependency;
mod fifo;
mod latency;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::dedup::CacheKey;
use super::entry::RequestMeta;

pub use dependency::{priority_score, DependencyAwarePolicy};
pub use fifo::FifoPolicy;
pub use latency::{LatencyAwarePolicy, LatencyTier};

/// How a new submission enters the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Execute now, ignoring the concurrency ceiling.
    Bypass,
    /// Execute now if a slot is free, otherwise queue.
    Immediate,
    /// Always queue, even with free slots.
    Queue,
}

/// Keys whose evaluation has completed successfully on this scheduler.
#[derive(Debug, Default, Clone)]
pub struct ReadinessState {
    processed: HashSet<CacheKey>,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_processed(&mut self, key: CacheKey) {
        self.processed.insert(key);
    }

    pub fn is_processed(&self, key: &CacheKey) -> bool {
        self.processed.contains(key)
    }

    /// True when every dependency has completed.
    pub fn is_ready(&self, dependencies: &[CacheKey]) -> bool {
        dependencies.iter().all(|dep| self.processed.contains(dep))
    }
}

/// Inputs to one batch selection.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    /// Configured batch size (at least 1).
    pub batch_size: usize,
    /// Free slots below the concurrency ceiling at selection time.
    pub headroom: usize,
    pub now: Instant,
    pub readiness: &'a ReadinessState,
}

impl SelectionContext<'_> {
    /// Apply the adaptive cap: never pull more than the free slots.
    pub fn cap(&self, limit: usize, adaptive: bool) -> usize {
        let limit = limit.max(1);
        if adaptive {
            limit.min(self.headroom.max(1))
        } else {
            limit
        }
    }
}

/// Ordering and selection strategy consumed by the scheduler.
pub trait SchedulingPolicy: Send + Sync + fmt::Debug {
    /// Short name used in logs and spans.
    fn name(&self) -> &'static str;

    /// Route a submission that missed the cache.
    fn route(&self, _request: &RequestMeta, _readiness: &ReadinessState) -> Route {
        Route::Immediate
    }

    /// Pick the next batch from a queue snapshot in insertion order.
    ///
    /// Returns indices into `queue`, in execution order, without duplicates.
    /// An empty result means nothing is ready.
    fn select_batch(&self, queue: &[&RequestMeta], ctx: &SelectionContext<'_>) -> Vec<usize>;
}

/// Built-in policy selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Default,
    LatencyAware,
    DependencyAware,
}

impl PolicyKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "default" | "fifo" => Some(Self::Default),
            "latency_aware" | "latency" => Some(Self::LatencyAware),
            "dependency_aware" | "dependency" => Some(Self::DependencyAware),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::LatencyAware => "latency_aware",
            Self::DependencyAware => "dependency_aware",
        }
    }

    /// Instantiate the policy.
    pub fn build(self, adaptive_batch_size: bool) -> Box<dyn SchedulingPolicy> {
        match self {
            Self::Default => Box::new(FifoPolicy),
            Self::LatencyAware => Box::new(LatencyAwarePolicy::new(adaptive_batch_size)),
            Self::DependencyAware => Box::new(DependencyAwarePolicy::new(adaptive_batch_size)),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
