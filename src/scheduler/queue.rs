//! Bounded admission queue.
//!
//! Storage is insertion order. Removal happens in two places only: the drain
//! pass taking a batch, and a timer expiring an entry that is still queued.
//! Both run under the same lock, so an entry is either dequeued for
//! execution or timed out, never both.

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use super::entry::{RequestEntry, RequestMeta};
use crate::error::GateError;
use crate::telemetry::MetricsRecorder;

/// Thread-safe bounded FIFO of pending requests.
pub struct AdmissionQueue {
    entries: Mutex<Vec<RequestEntry>>,
    max_size: usize,
}

impl AdmissionQueue {
    pub fn new(max_size: usize) -> Self {
        Self { entries: Mutex::new(Vec::new()), max_size: max_size.max(1) }
    }

    /// Admit a request or reject it if the queue is full.
    ///
    /// The admission decision and its counter update happen under the queue
    /// lock. `arm` starts the entry's timeout timer and is only called for
    /// admitted entries. Returns the entry's position.
    pub fn try_admit<F>(
        &self,
        mut entry: RequestEntry,
        metrics: &MetricsRecorder,
        arm: F,
    ) -> Result<usize, GateError>
    where
        F: FnOnce(&RequestEntry) -> AbortHandle,
    {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max_size {
            metrics.record_rejected();
            return Err(GateError::AdmissionRejected {
                queue_size: entries.len(),
                max_queue_size: self.max_size,
            });
        }

        let timer = arm(&entry);
        entry.arm(timer);
        let position = entries.len();
        entries.push(entry);
        metrics.record_admitted();
        metrics.record_queue_depth(entries.len());
        Ok(position)
    }

    /// Remove a still-queued entry whose timer fired.
    ///
    /// Returns `None` if the entry already left the queue.
    pub fn remove_expired(&self, id: u64) -> Option<(RequestEntry, usize)> {
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|e| e.id == id)?;
        Some((entries.remove(position), position))
    }

    /// Let `select` pick indices from a snapshot, then remove those entries.
    ///
    /// Out-of-range and repeated indices are ignored. Taken entries have their
    /// timers disarmed and are returned in selection order.
    pub fn take_batch<F>(&self, select: F) -> Vec<RequestEntry>
    where
        F: FnOnce(&[&RequestMeta]) -> Vec<usize>,
    {
        let mut entries = self.entries.lock();
        if entries.is_empty() {
            return Vec::new();
        }

        let picked = {
            let metas: Vec<&RequestMeta> = entries.iter().map(|e| &e.meta).collect();
            select(&metas)
        };
        if picked.is_empty() {
            return Vec::new();
        }

        let mut slots: Vec<Option<RequestEntry>> = entries.drain(..).map(Some).collect();
        let mut batch = Vec::with_capacity(picked.len());
        for index in picked {
            if let Some(mut entry) = slots.get_mut(index).and_then(Option::take) {
                entry.disarm();
                batch.push(entry);
            }
        }
        entries.extend(slots.into_iter().flatten());
        batch
    }

    /// Run `select` on a snapshot without removing anything.
    pub fn would_select<F>(&self, select: F) -> bool
    where
        F: FnOnce(&[&RequestMeta]) -> Vec<usize>,
    {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return false;
        }
        let metas: Vec<&RequestMeta> = entries.iter().map(|e| &e.meta).collect();
        select(&metas).into_iter().any(|i| i < metas.len())
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl std::fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionQueue")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
