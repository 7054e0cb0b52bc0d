//! The evaluation service contract consumed by the scheduler.
//!
//! The scheduler never looks inside payloads or results. An `Evaluator`
//! receives the request key, the payload and the caller context, and either
//! returns an `EvalResult` or fails with an opaque `EvaluatorError`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scheduler::CacheKey;

/// Result returned by the evaluation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub score: Option<f64>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub provider: String,
}

impl EvalResult {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            score: None,
            issues: Vec::new(),
            reasoning: String::new(),
            provider: provider.into(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }
}

/// Opaque evaluator failure.
///
/// Cloneable so the same failure can be logged and delivered. `Display` and
/// `source()` forward to the wrapped error unchanged.
#[derive(Clone)]
pub struct EvaluatorError {
    inner: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl EvaluatorError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self { inner: Arc::new(err) }
    }

    /// Build an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Attempt to downcast the wrapped error to a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl fmt::Debug for EvaluatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for EvaluatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::error::Error for EvaluatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// External evaluation service.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        key: &CacheKey,
        payload: &Value,
        context: &Value,
    ) -> Result<EvalResult, EvaluatorError>;
}

#[async_trait]
impl<E: Evaluator + ?Sized> Evaluator for Arc<E> {
    async fn evaluate(
        &self,
        key: &CacheKey,
        payload: &Value,
        context: &Value,
    ) -> Result<EvalResult, EvaluatorError> {
        (**self).evaluate(key, payload, context).await
    }
}

/// Adapts an async closure into an `Evaluator`.
///
/// The closure receives owned copies of the key, payload and context.
pub struct FnEvaluator<F> {
    func: F,
}

impl<F> FnEvaluator<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Evaluator for FnEvaluator<F>
where
    F: Fn(CacheKey, Value, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<EvalResult, EvaluatorError>> + Send,
{
    async fn evaluate(
        &self,
        key: &CacheKey,
        payload: &Value,
        context: &Value,
    ) -> Result<EvalResult, EvaluatorError> {
        (self.func)(*key, payload.clone(), context.clone()).await
    }
}
