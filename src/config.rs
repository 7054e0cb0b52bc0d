//! Scheduler configuration loading from environment variables and TOML.
//!
//! All values are loaded from `EVALGATE_*` environment variables with
//! sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `EVALGATE_MAX_CONCURRENCY` | 5 | Concurrent evaluator calls |
//! | `EVALGATE_BATCH_SIZE` | 3 | Requests per dispatched batch |
//! | `EVALGATE_CACHE_ENABLED` | true | Reuse results for identical payloads |
//! | `EVALGATE_MAX_QUEUE_SIZE` | 1000 | Max pending requests |
//! | `EVALGATE_REQUEST_TIMEOUT_MS` | 30000 | Max time a request may wait queued |
//! | `EVALGATE_DEFAULT_MAX_LATENCY_MS` | 1000 | Latency budget when none is given |
//! | `EVALGATE_ADAPTIVE_BATCH_SIZE` | true | Cap batches at free concurrency |
//! | `EVALGATE_POLICY` | default | `default`, `latency_aware` or `dependency_aware` |
//! | `EVALGATE_LOG_LEVEL` | info | Tracing filter directive |
//! | `EVALGATE_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::PolicyKind;
use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 3;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_LATENCY_MS: u64 = 1000;

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub cache_enabled: bool,
    pub max_queue_size: usize,
    /// Max time a request may sit in the queue before it is timed out.
    pub request_timeout_ms: u64,
    /// Latency budget assigned to submissions that declare none.
    pub default_max_latency_ms: u64,
    /// Cap batches at the free concurrency (latency/dependency policies).
    pub adaptive_batch_size: bool,
    pub policy: PolicyKind,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            cache_enabled: true,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            default_max_latency_ms: DEFAULT_MAX_LATENCY_MS,
            adaptive_batch_size: true,
            policy: PolicyKind::Default,
        }
    }
}

impl GateConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn default_max_latency(&self) -> Duration {
        Duration::from_millis(self.default_max_latency_ms)
    }

    /// Floor sizes and timeouts to 1 so the scheduler can always make progress.
    pub fn sanitized(mut self) -> Self {
        self.max_concurrency = self.max_concurrency.max(1);
        self.batch_size = self.batch_size.max(1);
        self.max_queue_size = self.max_queue_size.max(1);
        self.request_timeout_ms = self.request_timeout_ms.max(1);
        self
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        Ok(config.sanitized())
    }
}

/// Errors loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load a `GateConfig` from a TOML file.
pub fn load_file(path: impl AsRef<Path>) -> Result<GateConfig, ConfigError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    GateConfig::from_toml_str(&source)
}

/// Effective configuration summary, as printed by `config show`.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub cache_enabled: bool,
    pub max_queue_size: usize,
    pub request_timeout_ms: u64,
    pub default_max_latency_ms: u64,
    pub adaptive_batch_size: bool,
    pub policy: &'static str,
    pub log_level: String,
    pub log_format: &'static str,
}

impl EffectiveConfig {
    /// `(variable, value)` pairs in documentation order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("EVALGATE_MAX_CONCURRENCY", self.max_concurrency.to_string()),
            ("EVALGATE_BATCH_SIZE", self.batch_size.to_string()),
            ("EVALGATE_CACHE_ENABLED", self.cache_enabled.to_string()),
            ("EVALGATE_MAX_QUEUE_SIZE", self.max_queue_size.to_string()),
            ("EVALGATE_REQUEST_TIMEOUT_MS", self.request_timeout_ms.to_string()),
            ("EVALGATE_DEFAULT_MAX_LATENCY_MS", self.default_max_latency_ms.to_string()),
            ("EVALGATE_ADAPTIVE_BATCH_SIZE", self.adaptive_batch_size.to_string()),
            ("EVALGATE_POLICY", self.policy.to_string()),
            ("EVALGATE_LOG_LEVEL", self.log_level.clone()),
            ("EVALGATE_LOG_FORMAT", self.log_format.to_string()),
        ]
    }
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub gate: GateConfig,
    pub log: LogConfig,
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            max_concurrency: self.gate.max_concurrency,
            batch_size: self.gate.batch_size,
            cache_enabled: self.gate.cache_enabled,
            max_queue_size: self.gate.max_queue_size,
            request_timeout_ms: self.gate.request_timeout_ms,
            default_max_latency_ms: self.gate.default_max_latency_ms,
            adaptive_batch_size: self.gate.adaptive_batch_size,
            policy: self.gate.policy.as_str(),
            log_level: self.log.level.clone(),
            log_format: self.log.format.as_str(),
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a boolean env var. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn load_gate_config() -> GateConfig {
    let policy = std::env::var("EVALGATE_POLICY")
        .ok()
        .and_then(|name| PolicyKind::parse(&name))
        .unwrap_or_default();

    GateConfig {
        max_concurrency: parse_usize("EVALGATE_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY),
        batch_size: parse_usize("EVALGATE_BATCH_SIZE", DEFAULT_BATCH_SIZE),
        cache_enabled: parse_bool("EVALGATE_CACHE_ENABLED", true),
        max_queue_size: parse_usize("EVALGATE_MAX_QUEUE_SIZE", DEFAULT_MAX_QUEUE_SIZE),
        request_timeout_ms: parse_u64("EVALGATE_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS),
        default_max_latency_ms: parse_u64("EVALGATE_DEFAULT_MAX_LATENCY_MS", DEFAULT_MAX_LATENCY_MS),
        adaptive_batch_size: parse_bool("EVALGATE_ADAPTIVE_BATCH_SIZE", true),
        policy,
    }
    .sanitized()
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    LogConfig {
        level: std::env::var("EVALGATE_LOG_LEVEL").unwrap_or(defaults.level),
        format: std::env::var("EVALGATE_LOG_FORMAT")
            .map(|name| LogFormat::parse(&name))
            .unwrap_or(defaults.format),
        output_path: defaults.output_path,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig { gate: load_gate_config(), log: load_log_config() }
}
