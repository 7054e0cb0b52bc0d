//! Request scheduling: admission, batching, and result reuse.
//!
//! [`Scheduler`] is the entry point. The remaining types are exposed for
//! custom policies and for tests.

mod dedup;
mod engine;
mod entry;
pub mod policy;
mod queue;
mod slots;

pub use dedup::{CacheKey, ResultCache};
pub use engine::{Scheduler, SubmitOptions};
pub use entry::{Outcome, RequestEntry, RequestMeta, Settlement};
pub use policy::{
    DependencyAwarePolicy, FifoPolicy, LatencyAwarePolicy, LatencyTier, PolicyKind,
    ReadinessState, Route, SchedulingPolicy, SelectionContext,
};
pub use queue::AdmissionQueue;
pub use slots::{ConcurrencySlots, SlotGuard};
