//! evalgate
//!
//! Adaptive request batching and admission control in front of an expensive
//! asynchronous evaluator.
//!
//! # Guarantees
//!
//! - **Bounded**: at most `max_concurrency` evaluator calls run at once,
//!   except latency-critical bypass requests
//! - **Backpressure**: submissions beyond `max_queue_size` pending requests
//!   are rejected immediately
//! - **Single outcome**: every submission settles exactly once, as a result,
//!   a rejection, a timeout, or an evaluator error
//! - **Reuse**: identical payloads are served from a content-hash cache
//!
//! ```no_run
//! use evalgate::{CacheKey, EvalResult, EvaluatorError, FnEvaluator, GateConfig, Scheduler};
//! use serde_json::{json, Value};
//!
//! # async fn run() -> Result<(), evalgate::GateError> {
//! let evaluator = FnEvaluator::new(|_key: CacheKey, _payload: Value, _context: Value| async {
//!     Ok::<_, EvaluatorError>(EvalResult::new("demo").with_score(0.9))
//! });
//! let scheduler = Scheduler::new(GateConfig::default(), evaluator);
//! let result = scheduler.submit(json!({"text": "hello"}), json!({})).await?;
//! assert_eq!(result.score, Some(0.9));
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod scheduler;
pub mod telemetry;

pub use config::GateConfig;
pub use error::{GateError, MetricsError};
pub use evaluator::{EvalResult, Evaluator, EvaluatorError, FnEvaluator};
pub use scheduler::{CacheKey, PolicyKind, Scheduler, SchedulingPolicy, SubmitOptions};
pub use telemetry::{CacheStats, PerformanceMetrics};
