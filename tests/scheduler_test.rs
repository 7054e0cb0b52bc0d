//! End-to-end scheduler behavior under paused time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use evalgate::{
    CacheKey, EvalResult, Evaluator, EvaluatorError, GateConfig, GateError, PolicyKind, Scheduler,
    SubmitOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Start(u64, u128),
    End(u64, u128),
}

/// Evaluator whose latency and failure come from the payload:
/// `{"id": n, "delay_ms": d, "fail": true}`.
struct Scripted {
    origin: Instant,
    events: Mutex<Vec<Event>>,
    active: Mutex<(usize, usize)>,
}

impl Scripted {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            events: Mutex::new(Vec::new()),
            active: Mutex::new((0, 0)),
        })
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn starts(&self) -> Vec<(u64, u128)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Start(id, at) => Some((id, at)),
                Event::End(..) => None,
            })
            .collect()
    }

    fn end_order(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::End(id, _) => Some(id),
                Event::Start(..) => None,
            })
            .collect()
    }

    fn calls(&self) -> usize {
        self.starts().len()
    }

    fn peak(&self) -> usize {
        self.active.lock().1
    }

    fn now_ms(&self) -> u128 {
        self.origin.elapsed().as_millis()
    }
}

#[async_trait]
impl Evaluator for Scripted {
    async fn evaluate(
        &self,
        _key: &CacheKey,
        payload: &Value,
        _context: &Value,
    ) -> Result<EvalResult, EvaluatorError> {
        let id = payload["id"].as_u64().unwrap_or(0);
        let delay = payload["delay_ms"].as_u64().unwrap_or(100);
        {
            let mut active = self.active.lock();
            active.0 += 1;
            active.1 = active.1.max(active.0);
        }
        self.events.lock().push(Event::Start(id, self.now_ms()));

        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.active.lock().0 -= 1;
        self.events.lock().push(Event::End(id, self.now_ms()));
        if payload.get("fail").is_some() {
            return Err(EvaluatorError::msg(format!("request {id} failed")));
        }
        Ok(EvalResult::new("scripted").with_score(id as f64))
    }
}

fn request(id: u64) -> Value {
    json!({ "id": id, "delay_ms": 100 })
}

fn spawn_submit(
    scheduler: &Scheduler,
    payload: Value,
    options: SubmitOptions,
) -> tokio::task::JoinHandle<Result<EvalResult, GateError>> {
    let scheduler = scheduler.clone();
    tokio::spawn(async move { scheduler.submit_with(payload, Value::Null, options).await })
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn five_requests_drain_in_batches_of_two_then_one() {
    let eval = Scripted::new();
    let config = GateConfig { max_concurrency: 2, batch_size: 2, ..GateConfig::default() };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let mut handles = Vec::new();
    for id in 1..=5 {
        handles.push(spawn_submit(&scheduler, request(id), SubmitOptions::new()));
        settle().await;
    }
    assert_eq!(scheduler.queue_len(), 3);

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let starts = eval.starts();
    let at: Vec<u128> = starts.iter().map(|(_, t)| *t).collect();
    assert_eq!(at, vec![0, 0, 100, 100, 200]);
    let ids: Vec<u64> = starts.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let snap = scheduler.metrics_snapshot();
    assert_eq!(snap.batches_dispatched, 2);
    assert_eq!(snap.total_queued, 5);
    assert_eq!(snap.total_processed, 5);
}

#[tokio::test(start_paused = true)]
async fn full_queue_rejects_immediately() {
    let eval = Scripted::new();
    let config = GateConfig { max_concurrency: 2, max_queue_size: 1, ..GateConfig::default() };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let mut handles = Vec::new();
    for id in 1..=3 {
        handles.push(spawn_submit(&scheduler, request(id), SubmitOptions::new()));
        settle().await;
    }
    assert_eq!(scheduler.queue_len(), 1);

    let started = Instant::now();
    let err = assert_err!(scheduler.submit(request(4), Value::Null).await);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(matches!(
        err,
        GateError::AdmissionRejected { queue_size: 1, max_queue_size: 1 }
    ));
    assert!(err.is_warning());
    assert_eq!(scheduler.metrics_snapshot().rejections, 1);

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    let metrics = scheduler.performance_metrics();
    assert_eq!(metrics.queue.rejections, 1);
    assert!((metrics.queue.rejection_rate - 0.25).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn stalled_evaluator_times_out_queued_request() {
    let eval = Scripted::new();
    let config = GateConfig { max_concurrency: 1, request_timeout_ms: 100, ..GateConfig::default() };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let stalled = spawn_submit(
        &scheduler,
        json!({ "id": 1, "delay_ms": 150 }),
        SubmitOptions::new(),
    );
    settle().await;

    let err = scheduler.submit(request(2), Value::Null).await.unwrap_err();
    match err {
        GateError::RequestTimeout { configured_timeout_ms, wait_time_ms, queue_position } => {
            assert_eq!(configured_timeout_ms, 100);
            assert_eq!(wait_time_ms, 100);
            assert_eq!(queue_position, 0);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(scheduler.queue_len(), 0);

    assert!(stalled.await.unwrap().is_ok());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snap = scheduler.metrics_snapshot();
    assert_eq!(snap.timeouts, 1);
    assert_eq!(snap.total_queued, 2);
    assert_eq!(snap.total_processed, 1);
    assert_eq!(eval.calls(), 1, "timed-out request must never reach the evaluator");
    assert!((scheduler.performance_metrics().queue.timeout_rate - 0.5).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn repeated_payload_served_from_cache() {
    let eval = Scripted::new();
    let scheduler = Scheduler::new(GateConfig::default(), Arc::clone(&eval));

    let first = assert_ok!(scheduler.submit(request(9), json!({"caller": "a"})).await);
    let second = assert_ok!(scheduler.submit(request(9), json!({"caller": "b"})).await);

    assert_eq!(first, second);
    assert_eq!(eval.calls(), 1);
    let snap = scheduler.metrics_snapshot();
    assert_eq!(snap.cache_hits, 1);
    assert_eq!(snap.total_queued, 1);
    assert_eq!(scheduler.cache_stats().cache_size, 1);

    scheduler.clear_cache();
    scheduler.submit(request(9), Value::Null).await.unwrap();
    assert_eq!(eval.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn latency_critical_request_overtakes_queue() {
    let eval = Scripted::new();
    let config = GateConfig {
        max_concurrency: 1,
        policy: PolicyKind::LatencyAware,
        default_max_latency_ms: 1000,
        ..GateConfig::default()
    };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let mut normal = Vec::new();
    for id in 1..=10 {
        normal.push(spawn_submit(&scheduler, request(id), SubmitOptions::new()));
        settle().await;
    }
    assert_eq!(scheduler.queue_len(), 9);

    let urgent = scheduler
        .submit_with(
            json!({ "id": 99, "delay_ms": 10 }),
            Value::Null,
            SubmitOptions::new().max_latency(Duration::from_millis(50)),
        )
        .await;
    assert!(urgent.is_ok());

    for handle in normal {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(eval.end_order().first(), Some(&99));
    assert_eq!(scheduler.metrics_snapshot().bypassed, 1);
}

#[tokio::test(start_paused = true)]
async fn tight_budget_jumps_normal_entries() {
    let eval = Scripted::new();
    let config = GateConfig {
        max_concurrency: 1,
        policy: PolicyKind::LatencyAware,
        ..GateConfig::default()
    };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let mut handles = vec![spawn_submit(&scheduler, request(1), SubmitOptions::new())];
    settle().await;
    handles.push(spawn_submit(&scheduler, request(2), SubmitOptions::new()));
    settle().await;
    handles.push(spawn_submit(
        &scheduler,
        request(3),
        SubmitOptions::new().max_latency(Duration::from_millis(150)),
    ));
    settle().await;

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    let ids: Vec<u64> = eval.starts().iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 3, 2]);
}

#[tokio::test(start_paused = true)]
async fn dependent_waits_for_dependency() {
    let eval = Scripted::new();
    let config = GateConfig { policy: PolicyKind::DependencyAware, ..GateConfig::default() };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let a = request(1);
    let a_key = CacheKey::of(&a);
    let b = spawn_submit(&scheduler, request(2), SubmitOptions::new().depends_on(a_key));
    let a = spawn_submit(&scheduler, a, SubmitOptions::new());

    assert!(a.await.unwrap().is_ok());
    assert!(b.await.unwrap().is_ok());
    assert!(scheduler.is_processed(&a_key));

    let events = eval.events();
    let a_end = events.iter().position(|e| matches!(e, Event::End(1, _))).unwrap();
    let b_start = events.iter().position(|e| matches!(e, Event::Start(2, _))).unwrap();
    assert!(a_end < b_start, "B started before A resolved: {events:?}");
}

#[tokio::test(start_paused = true)]
async fn failed_dependency_leaves_dependent_to_time_out() {
    let eval = Scripted::new();
    let config = GateConfig {
        policy: PolicyKind::DependencyAware,
        request_timeout_ms: 500,
        ..GateConfig::default()
    };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let a = json!({ "id": 1, "delay_ms": 100, "fail": true });
    let a_key = CacheKey::of(&a);
    let b = spawn_submit(&scheduler, request(2), SubmitOptions::new().depends_on(a_key));
    settle().await;

    assert!(scheduler.submit(a, Value::Null).await.unwrap_err().is_execution());
    let err = b.await.unwrap().unwrap_err();
    assert!(matches!(err, GateError::RequestTimeout { .. }));
    assert_eq!(eval.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn completed_dependency_lets_child_run_immediately() {
    let eval = Scripted::new();
    let config = GateConfig { policy: PolicyKind::DependencyAware, ..GateConfig::default() };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let parent = request(1);
    let parent_key = CacheKey::of(&parent);
    scheduler.submit(parent.clone(), Value::Null).await.unwrap();

    let child = scheduler
        .submit_with(request(2), Value::Null, SubmitOptions::new().depends_on(parent_key))
        .await;
    assert!(child.is_ok());
    assert_eq!(eval.calls(), 2);
    assert_eq!(scheduler.metrics_snapshot().batches_dispatched, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrency_ceiling_holds_with_unit_batches() {
    let eval = Scripted::new();
    let config = GateConfig { max_concurrency: 2, batch_size: 1, ..GateConfig::default() };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let handles: Vec<_> = (1..=10)
        .map(|id| spawn_submit(&scheduler, request(id), SubmitOptions::new()))
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(eval.peak(), 2);
    assert_eq!(scheduler.cache_stats().active_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn counters_are_conserved_at_quiescence() {
    let eval = Scripted::new();
    let config = GateConfig {
        max_concurrency: 2,
        max_queue_size: 4,
        request_timeout_ms: 250,
        ..GateConfig::default()
    };
    let scheduler = Scheduler::new(config, Arc::clone(&eval));

    let handles: Vec<_> = (1..=12)
        .map(|id| {
            let payload = if id % 5 == 0 {
                json!({ "id": id, "delay_ms": 100, "fail": true })
            } else {
                request(id)
            };
            spawn_submit(&scheduler, payload, SubmitOptions::new())
        })
        .collect();

    let mut outcomes = (0, 0, 0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => outcomes.0 += 1,
            Err(GateError::AdmissionRejected { .. }) => outcomes.1 += 1,
            Err(GateError::RequestTimeout { .. }) => outcomes.2 += 1,
            Err(_) => outcomes.3 += 1,
        }
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snap = scheduler.metrics_snapshot();
    assert_eq!(snap.total_queued, snap.total_processed + snap.timeouts);
    assert_eq!(snap.rejections, outcomes.1);
    assert_eq!(snap.timeouts, outcomes.2);
    assert_eq!(snap.failures, outcomes.3);
    assert_eq!(outcomes.0 + outcomes.1 + outcomes.2 + outcomes.3, 12);
    assert_eq!(scheduler.queue_len(), 0);
    assert_eq!(scheduler.cache_stats().active_requests, 0);
}
