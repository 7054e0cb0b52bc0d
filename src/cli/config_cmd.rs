// Copyright 2024-2026 evalgate Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration from environment variables, or from a
//! TOML file when one is given, without constructing a scheduler.

use crate::config::{self, EffectiveConfig, EnvConfig, GateConfig};
use crate::scheduler::PolicyKind;
use crate::telemetry::LogConfig;

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    let env = EnvConfig { gate: GateConfig::default(), log: LogConfig::default() };
    print_config(&env.effective_config());
}

/// Validate configuration for likely misconfigurations.
///
/// With `path`, the TOML file is checked instead of the environment.
/// Returns 0 if valid, 1 if any warnings are found, 2 if the file is unreadable.
pub fn run_validate(path: Option<&str>) -> i32 {
    let gate = match path {
        Some(path) => match config::load_file(path) {
            Ok(gate) => gate,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                return 2;
            }
        },
        None => config::load().gate,
    };

    let warnings = check(&gate);
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Collect human-readable warnings for `gate`.
pub fn check(gate: &GateConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if gate.batch_size > gate.max_concurrency {
        warnings.push(format!(
            "batch_size ({}) > max_concurrency ({}); batches will run above the ceiling",
            gate.batch_size, gate.max_concurrency
        ));
    }

    if gate.policy == PolicyKind::LatencyAware && gate.default_max_latency_ms < 100 {
        warnings.push(format!(
            "default_max_latency_ms ({}) < 100 with latency_aware policy; \
             requests without a budget will all bypass the queue",
            gate.default_max_latency_ms
        ));
    }

    if gate.request_timeout_ms < gate.default_max_latency_ms {
        warnings.push(format!(
            "request_timeout_ms ({}) < default_max_latency_ms ({})",
            gate.request_timeout_ms, gate.default_max_latency_ms
        ));
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    for (key, value) in cfg.entries() {
        println!("{}={}", key, value);
    }
}
