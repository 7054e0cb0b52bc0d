//! Concurrency ceiling for outstanding evaluator calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct SlotsInner {
    max: usize,
    active: AtomicUsize,
}

/// Counter of in-flight evaluator calls with a soft ceiling.
///
/// `try_acquire` respects the ceiling. `acquire_unchecked` does not: batch
/// members and latency-bypass requests may transiently over-subscribe.
#[derive(Clone)]
pub struct ConcurrencySlots {
    inner: Arc<SlotsInner>,
}

impl ConcurrencySlots {
    pub fn new(max: usize) -> Self {
        Self {
            inner: Arc::new(SlotsInner { max: max.max(1), active: AtomicUsize::new(0) }),
        }
    }

    /// Reserve a slot if one is free.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        let inner = &self.inner;
        let prev = inner.active.fetch_add(1, Ordering::SeqCst);
        if prev >= inner.max {
            inner.active.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(SlotGuard { inner: Arc::clone(&self.inner) })
    }

    /// Reserve a slot regardless of the ceiling.
    pub fn acquire_unchecked(&self) -> SlotGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        SlotGuard { inner: Arc::clone(&self.inner) }
    }

    /// Current number of reserved slots.
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.inner.max
    }

    /// Free slots below the ceiling (zero when over-subscribed).
    pub fn headroom(&self) -> usize {
        self.inner.max.saturating_sub(self.active())
    }

    pub fn has_headroom(&self) -> bool {
        self.headroom() > 0
    }
}

impl std::fmt::Debug for ConcurrencySlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencySlots")
            .field("active", &self.active())
            .field("max", &self.inner.max)
            .finish()
    }
}

/// RAII guard that releases its slot when dropped.
pub struct SlotGuard {
    inner: Arc<SlotsInner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}
