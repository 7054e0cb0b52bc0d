//! Readiness-gated, priority-scored batching.
//!
//! A request waits until every key it depends on has completed successfully
//! on this scheduler. Among ready requests, higher scores run first. A
//! request whose dependency never completes stays queued until its own
//! timeout fires.

use std::cmp::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use super::{ReadinessState, Route, SchedulingPolicy, SelectionContext};
use crate::scheduler::entry::RequestMeta;

const ROOT_BONUS: f64 = 100.0;
const PER_DEPENDENCY_PENALTY: f64 = 10.0;
const RECENCY_BONUS: f64 = 10.0;
const RECENCY_HORIZON: Duration = Duration::from_secs(60);
const CRITICAL_BONUS: f64 = 50.0;

/// Priority score of a request at `now`.
///
/// `base + recency + criticality`, where base is +100 with no dependencies
/// and -10 per dependency otherwise, recency decays linearly to zero over
/// 60s since admission, and critical requests get +50.
pub fn priority_score(meta: &RequestMeta, now: Instant) -> f64 {
    let base = if meta.dependencies.is_empty() {
        ROOT_BONUS
    } else {
        -PER_DEPENDENCY_PENALTY * meta.dependencies.len() as f64
    };
    let age = now.saturating_duration_since(meta.enqueued_at);
    let freshness = 1.0 - age.as_secs_f64() / RECENCY_HORIZON.as_secs_f64();
    let recency = RECENCY_BONUS * freshness.max(0.0);
    let criticality = if meta.critical { CRITICAL_BONUS } else { 0.0 };
    base + recency + criticality
}

#[derive(Debug, Clone, Copy)]
pub struct DependencyAwarePolicy {
    adaptive: bool,
}

impl DependencyAwarePolicy {
    pub fn new(adaptive: bool) -> Self {
        Self { adaptive }
    }
}

impl Default for DependencyAwarePolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SchedulingPolicy for DependencyAwarePolicy {
    fn name(&self) -> &'static str {
        "dependency_aware"
    }

    fn route(&self, request: &RequestMeta, readiness: &ReadinessState) -> Route {
        if readiness.is_ready(&request.dependencies) {
            Route::Immediate
        } else {
            Route::Queue
        }
    }

    fn select_batch(&self, queue: &[&RequestMeta], ctx: &SelectionContext<'_>) -> Vec<usize> {
        let limit = ctx.cap(ctx.batch_size, self.adaptive);
        let mut scored: Vec<(usize, f64)> = queue
            .iter()
            .enumerate()
            .map(|(i, meta)| (i, priority_score(meta, ctx.now)))
            .collect();
        scored.sort_by(|(ia, sa), (ib, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| queue[*ia].seq.cmp(&queue[*ib].seq))
        });

        scored
            .into_iter()
            .map(|(i, _)| i)
            .filter(|&i| ctx.readiness.is_ready(&queue[i].dependencies))
            .take(limit)
            .collect()
    }
}
