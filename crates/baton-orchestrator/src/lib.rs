//! Adaptive multi-agent task orchestration for Baton.
//!
//! A task is driven through a bounded sequence of refine/evaluate
//! iterations. Each iteration is performed by one of several interchangeable
//! execution agents; at scheduled checkpoints the switch decision engine may
//! hand the task to a different agent based on running quality and cost.
//!
//! Leaf components:
//! - [`routing`]: complexity classifier and initial router
//! - [`quality`]: multi-dimension quality evaluator
//! - [`cost_model`]: per-agent EWMA cost/quality/latency estimates
//! - [`checkpoint`]: checkpoint scheduler
//! - [`switching`]: switch decision engine
//!
//! The [`executor`] ties them together; the [`dispatcher`] runs many tasks
//! concurrently.

pub mod checkpoint;
pub mod cost_model;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod persistence;
pub mod policy;
pub mod progress;
pub mod quality;
pub mod registry;
pub mod retry;
pub mod routing;
pub mod switching;
pub mod task;

pub use checkpoint::CheckpointSchedule;
pub use cost_model::{CostQualityModel, Estimate, Observation};
pub use dispatcher::{TaskDispatcher, TaskDispatcherConfig, TaskHandle};
pub use error::{OrchestrationError, Result};
pub use executor::{AdmittedTask, DEFAULT_SCOPE, TaskExecutor};
pub use lifecycle::TaskStatus;
pub use persistence::{JsonlSink, MemoryStore, persist_with_retry};
pub use policy::{
    HrmPolicy, PolicyError, PolicySnapshot, PolicySource, PolicyStore, SwitchingStrategy,
    store::StrictPolicySource,
};
pub use progress::{NullProgress, ProgressMetrics, ProgressReporter};
pub use quality::{QualityEvaluator, QualityWeights};
pub use registry::{AgentProfile, AgentRegistry, RegistryError};
pub use retry::RetryPolicy;
pub use routing::{
    ClassifierConfig, ComplexityBucket, ComplexityClassifier, RouteRationale, Router,
    RoutingDecision, TaskSignals,
};
pub use switching::{
    CandidateGain, KeepReason, SwitchContext, SwitchDecision, SwitchDecisionEngine, SwitchPlan,
    SwitchTrigger, cost_benefit,
};
pub use task::{Task, TaskLimits, TaskOutcome, TaskRequest};
