//! Tests for the admission queue.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::AbortHandle;

use super::*;
use crate::scheduler::entry::{RequestMeta, ResponseRx, Settlement};
use crate::scheduler::CacheKey;

fn entry(id: u64) -> (RequestEntry, ResponseRx) {
    let payload = json!({ "id": id });
    let meta = RequestMeta::new(CacheKey::of(&payload), Duration::from_secs(1)).with_seq(id);
    let (settlement, rx) = Settlement::channel();
    let entry = RequestEntry::new(id, meta, payload, Value::Null, Duration::from_secs(30), settlement);
    (entry, rx)
}

fn idle_timer(_: &RequestEntry) -> AbortHandle {
    tokio::spawn(std::future::pending::<()>()).abort_handle()
}

#[tokio::test]
async fn admit_reports_position() {
    let queue = AdmissionQueue::new(4);
    let metrics = MetricsRecorder::new();
    assert_eq!(queue.try_admit(entry(1).0, &metrics, idle_timer).unwrap(), 0);
    assert_eq!(queue.try_admit(entry(2).0, &metrics, idle_timer).unwrap(), 1);
    assert_eq!(queue.len(), 2);
    assert_eq!(metrics.snapshot().total_queued, 2);
}

#[tokio::test]
async fn full_queue_rejects_and_counts() {
    let queue = AdmissionQueue::new(1);
    let metrics = MetricsRecorder::new();
    queue.try_admit(entry(1).0, &metrics, idle_timer).unwrap();

    let mut armed = false;
    let err = queue
        .try_admit(entry(2).0, &metrics, |e| {
            armed = true;
            idle_timer(e)
        })
        .unwrap_err();
    assert!(!armed, "rejected entries must not start a timer");
    assert!(matches!(
        err,
        GateError::AdmissionRejected { queue_size: 1, max_queue_size: 1 }
    ));

    let snap = metrics.snapshot();
    assert_eq!(snap.total_queued, 1);
    assert_eq!(snap.rejections, 1);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn take_batch_removes_in_selection_order() {
    let queue = AdmissionQueue::new(8);
    let metrics = MetricsRecorder::new();
    for id in 1..=4 {
        queue.try_admit(entry(id).0, &metrics, idle_timer).unwrap();
    }

    let batch = queue.take_batch(|metas| {
        assert_eq!(metas.len(), 4);
        vec![2, 0, 2, 9]
    });
    let ids: Vec<u64> = batch.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![3, 1]);

    // Remaining entries keep insertion order.
    let rest = queue.take_batch(|metas| (0..metas.len()).collect());
    let ids: Vec<u64> = rest.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![2, 4]);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn empty_selection_leaves_queue_untouched() {
    let queue = AdmissionQueue::new(8);
    let metrics = MetricsRecorder::new();
    queue.try_admit(entry(1).0, &metrics, idle_timer).unwrap();
    assert!(queue.take_batch(|_| Vec::new()).is_empty());
    assert!(!queue.would_select(|_| Vec::new()));
    assert!(queue.would_select(|_| vec![0]));
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn expired_entry_removed_once() {
    let queue = AdmissionQueue::new(8);
    let metrics = MetricsRecorder::new();
    queue.try_admit(entry(1).0, &metrics, idle_timer).unwrap();
    queue.try_admit(entry(2).0, &metrics, idle_timer).unwrap();

    let (removed, position) = queue.remove_expired(2).unwrap();
    assert_eq!(removed.id, 2);
    assert_eq!(position, 1);
    assert!(queue.remove_expired(2).is_none());
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn dequeued_entry_cannot_expire() {
    let queue = AdmissionQueue::new(8);
    let metrics = MetricsRecorder::new();
    queue.try_admit(entry(7).0, &metrics, idle_timer).unwrap();
    let batch = queue.take_batch(|_| vec![0]);
    assert_eq!(batch.len(), 1);
    assert!(queue.remove_expired(7).is_none());
}
