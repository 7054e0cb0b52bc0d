// Copyright 2024-2026 evalgate Contributors
// SPDX-License-Identifier: Apache-2.0

//! `simulate` subcommand: drive a synthetic evaluator through the scheduler.
//!
//! Submits a burst of requests with random latency budgets, optional
//! dependency chains and repeated payloads, then prints the scheduler's
//! performance metrics as JSON.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::GateConfig;
use crate::error::GateError;
use crate::evaluator::{EvalResult, Evaluator, EvaluatorError};
use crate::scheduler::{CacheKey, PolicyKind, Scheduler, SubmitOptions};
use crate::telemetry::PerformanceMetrics;

const LATENCY_BUDGETS_MS: [u64; 4] = [50, 150, 500, 1000];

/// Parsed `simulate` options.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulateArgs {
    pub requests: usize,
    /// Number of distinct payloads; smaller values produce more cache hits.
    pub distinct: usize,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub fail_rate: f64,
    pub seed: u64,
    pub gate: GateConfig,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            requests: 100,
            distinct: 80,
            min_latency_ms: 20,
            max_latency_ms: 200,
            fail_rate: 0.0,
            seed: 7,
            gate: GateConfig::default(),
        }
    }
}

impl SimulateArgs {
    /// Parse `--flag value` pairs on top of `base`.
    pub fn parse(args: &[String], base: GateConfig) -> Result<Self, String> {
        let mut parsed = Self { gate: base, ..Self::default() };
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let value = iter
                .next()
                .ok_or_else(|| format!("missing value for {}", flag))?;
            match flag.as_str() {
                "--requests" => parsed.requests = number(flag, value)?,
                "--distinct" => parsed.distinct = number(flag, value)?,
                "--min-latency-ms" => parsed.min_latency_ms = number(flag, value)?,
                "--max-latency-ms" => parsed.max_latency_ms = number(flag, value)?,
                "--fail-rate" => parsed.fail_rate = number(flag, value)?,
                "--seed" => parsed.seed = number(flag, value)?,
                "--concurrency" => parsed.gate.max_concurrency = number(flag, value)?,
                "--batch-size" => parsed.gate.batch_size = number(flag, value)?,
                "--queue-size" => parsed.gate.max_queue_size = number(flag, value)?,
                "--timeout-ms" => parsed.gate.request_timeout_ms = number(flag, value)?,
                "--policy" => {
                    parsed.gate.policy = PolicyKind::parse(value)
                        .ok_or_else(|| format!("unknown policy: {}", value))?
                }
                other => return Err(format!("unknown option: {}", other)),
            }
        }

        if parsed.min_latency_ms > parsed.max_latency_ms {
            return Err("--min-latency-ms must not exceed --max-latency-ms".to_string());
        }
        if !(0.0..=1.0).contains(&parsed.fail_rate) {
            return Err("--fail-rate must be within 0..=1".to_string());
        }
        parsed.distinct = parsed.distinct.max(1);
        Ok(parsed)
    }
}

fn number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid value for {}: {}", flag, value))
}

/// Evaluator with random latency and failure rate.
struct SyntheticEvaluator {
    rng: Mutex<StdRng>,
    min_latency_ms: u64,
    max_latency_ms: u64,
    fail_rate: f64,
}

#[async_trait]
impl Evaluator for SyntheticEvaluator {
    async fn evaluate(
        &self,
        key: &CacheKey,
        _payload: &Value,
        _context: &Value,
    ) -> Result<EvalResult, EvaluatorError> {
        let (delay_ms, fails, score) = {
            let mut rng = self.rng.lock();
            (
                rng.gen_range(self.min_latency_ms..=self.max_latency_ms),
                rng.gen_bool(self.fail_rate),
                rng.gen_range(0.0..1.0),
            )
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if fails {
            return Err(EvaluatorError::msg(format!("synthetic failure for {}", key.short())));
        }
        Ok(EvalResult::new("synthetic").with_score(score))
    }
}

/// Outcome tally printed alongside the scheduler metrics.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub completed: usize,
    pub rejected: usize,
    pub timed_out: usize,
    pub failed: usize,
}

impl Tally {
    fn record(&mut self, outcome: &Result<EvalResult, GateError>) {
        match outcome {
            Ok(_) => self.completed += 1,
            Err(GateError::AdmissionRejected { .. }) => self.rejected += 1,
            Err(GateError::RequestTimeout { .. }) => self.timed_out += 1,
            Err(_) => self.failed += 1,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub policy: &'static str,
    pub outcomes: Tally,
    pub metrics: PerformanceMetrics,
}

/// Run the simulation and return its report.
pub async fn simulate(args: &SimulateArgs) -> SimulationReport {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let evaluator = SyntheticEvaluator {
        rng: Mutex::new(StdRng::seed_from_u64(args.seed.wrapping_add(1))),
        min_latency_ms: args.min_latency_ms,
        max_latency_ms: args.max_latency_ms,
        fail_rate: args.fail_rate,
    };
    let scheduler = Scheduler::new(args.gate.clone(), evaluator);

    let mut previous: Option<CacheKey> = None;
    let mut submissions = Vec::with_capacity(args.requests);
    for i in 0..args.requests {
        let payload = json!({ "item": rng.gen_range(0..args.distinct) });
        let key = CacheKey::of(&payload);
        let mut options = SubmitOptions::new()
            .max_latency(Duration::from_millis(LATENCY_BUDGETS_MS[rng.gen_range(0..4)]))
            .critical(rng.gen_bool(0.05));
        if i % 4 == 3 {
            if let Some(parent) = previous {
                options = options.depends_on(parent);
            }
        }
        previous = Some(key);

        let scheduler = scheduler.clone();
        submissions.push(async move {
            scheduler.submit_with(payload, json!({ "index": i }), options).await
        });
    }

    let mut outcomes = Tally::default();
    for outcome in join_all(submissions).await {
        outcomes.record(&outcome);
    }

    SimulationReport {
        policy: scheduler.policy_name(),
        outcomes,
        metrics: scheduler.performance_metrics(),
    }
}

/// CLI entry point. Returns the process exit code.
pub async fn run_simulate(args: &SimulateArgs) -> i32 {
    let report = simulate(args).await;
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Failed to encode report: {}", e);
            1
        }
    }
}
