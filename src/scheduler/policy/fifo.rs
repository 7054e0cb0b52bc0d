//! Arrival-order batching.

use super::{SchedulingPolicy, SelectionContext};
use crate::scheduler::entry::RequestMeta;

/// Takes the oldest `batch_size` requests. Stable and starvation-free.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoPolicy;

impl SchedulingPolicy for FifoPolicy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn select_batch(&self, queue: &[&RequestMeta], ctx: &SelectionContext<'_>) -> Vec<usize> {
        (0..queue.len().min(ctx.batch_size.max(1))).collect()
    }
}
