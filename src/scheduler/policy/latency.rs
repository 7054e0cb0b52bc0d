//! Latency-tiered batching.
//!
//! | Tier | Declared budget | Handling |
//! |---|---|---|
//! | `Bypass` | < 100ms | never queued, runs even above the ceiling |
//! | `Tight` | < 200ms | batches of one |
//! | `Normal` | otherwise | configured batch size |

use std::time::Duration;

use super::{ReadinessState, Route, SchedulingPolicy, SelectionContext};
use crate::scheduler::entry::RequestMeta;

const BYPASS_BELOW: Duration = Duration::from_millis(100);
const TIGHT_BELOW: Duration = Duration::from_millis(200);

/// Latency class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyTier {
    Bypass,
    Tight,
    Normal,
}

impl LatencyTier {
    pub fn classify(max_latency: Duration) -> Self {
        if max_latency < BYPASS_BELOW {
            Self::Bypass
        } else if max_latency < TIGHT_BELOW {
            Self::Tight
        } else {
            Self::Normal
        }
    }

    /// Largest batch a request of this tier may lead.
    pub fn batch_limit(self, configured: usize) -> usize {
        match self {
            Self::Bypass | Self::Tight => 1,
            Self::Normal => configured.max(1),
        }
    }
}

/// Orders the queue by declared latency budget, tightest first.
#[derive(Debug, Clone, Copy)]
pub struct LatencyAwarePolicy {
    adaptive: bool,
}

impl LatencyAwarePolicy {
    pub fn new(adaptive: bool) -> Self {
        Self { adaptive }
    }
}

impl Default for LatencyAwarePolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SchedulingPolicy for LatencyAwarePolicy {
    fn name(&self) -> &'static str {
        "latency_aware"
    }

    fn route(&self, request: &RequestMeta, _readiness: &ReadinessState) -> Route {
        match LatencyTier::classify(request.max_latency) {
            LatencyTier::Bypass => Route::Bypass,
            _ => Route::Immediate,
        }
    }

    fn select_batch(&self, queue: &[&RequestMeta], ctx: &SelectionContext<'_>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..queue.len()).collect();
        order.sort_by_key(|&i| (queue[i].max_latency, queue[i].seq));

        let Some(&first) = order.first() else {
            return Vec::new();
        };
        let tier = LatencyTier::classify(queue[first].max_latency);
        let limit = ctx.cap(tier.batch_limit(ctx.batch_size), self.adaptive);
        order.truncate(limit);
        order
    }
}
