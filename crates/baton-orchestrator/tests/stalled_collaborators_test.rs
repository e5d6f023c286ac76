//! A persistence sink or signal provider that never answers must not stall
//! the loop: every wait is bounded by a policy timeout or the task's
//! remaining duration.

mod common;

use async_trait::async_trait;
use baton_abstraction::{
    CostEntry, Dimension, DocReport, IterationRecord, PersistenceError, PersistenceSink,
    SecurityReport, SignalError, SignalProvider, SwitchEvent, TerminalReason, TestReport,
    TypeReport,
};
use baton_orchestrator::{
    AgentRegistry, CostQualityModel, Estimate, HrmPolicy, MemoryStore, NullProgress, PolicyStore,
    TaskExecutor, TaskStatus,
};
use common::{PatchSignals, ScriptedAgent, policy, request};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sink whose writes never complete.
struct StalledSink;

#[async_trait]
impl PersistenceSink for StalledSink {
    async fn append_iteration(&self, _record: &IterationRecord) -> Result<(), PersistenceError> {
        std::future::pending().await
    }

    async fn append_switch(&self, _event: &SwitchEvent) -> Result<(), PersistenceError> {
        std::future::pending().await
    }

    async fn append_cost(&self, _entry: &CostEntry) -> Result<(), PersistenceError> {
        std::future::pending().await
    }
}

/// Signals whose test run never completes; everything else answers at once.
struct StalledTests;

#[async_trait]
impl SignalProvider for StalledTests {
    async fn run_tests(&self, _patch: &str) -> Result<TestReport, SignalError> {
        std::future::pending().await
    }

    async fn scan_security(&self, patch: &str) -> Result<SecurityReport, SignalError> {
        PatchSignals.scan_security(patch).await
    }

    async fn check_types(&self, patch: &str) -> Result<TypeReport, SignalError> {
        PatchSignals.check_types(patch).await
    }

    async fn audit_docs(&self, patch: &str) -> Result<DocReport, SignalError> {
        PatchSignals.audit_docs(patch).await
    }
}

fn executor(
    policy: HrmPolicy,
    signals: Arc<dyn SignalProvider>,
    persistence: Arc<dyn PersistenceSink>,
) -> TaskExecutor {
    let registry = Arc::new(AgentRegistry::new());
    let model = Arc::new(CostQualityModel::default());
    model.seed("solo", Estimate::prior(0.2, 0.9, 500.0));
    registry.register(Arc::new(ScriptedAgent::sequence("solo", 0.2, &[0.9]))).unwrap();
    TaskExecutor::new(
        registry,
        model,
        signals,
        persistence,
        Arc::new(NullProgress),
        Arc::new(PolicyStore::new(policy).unwrap()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_stalled_sink_fails_task_with_persistence_error() {
    let policy = HrmPolicy {
        max_duration_secs: 60,
        persistence_timeout_secs: 5,
        persistence_attempts: 3,
        ..policy()
    };
    let executor = executor(policy, Arc::new(PatchSignals), Arc::new(StalledSink));

    let started = Instant::now();
    let outcome = executor.run(request("stalled-db"), CancellationToken::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.status(), TaskStatus::Failed);
    assert_eq!(outcome.reason, TerminalReason::PersistenceError);
    assert_eq!(outcome.iterations.len(), 1);
    assert!(elapsed >= Duration::from_secs(15), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(60), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_stalled_signal_scores_zero_per_attempt_timeout() {
    let policy = HrmPolicy {
        max_iterations: 3,
        signal_timeout_secs: 2,
        signal_attempts: 2,
        ..policy()
    };
    let executor = executor(policy, Arc::new(StalledTests), Arc::new(MemoryStore::new()));

    let started = Instant::now();
    let outcome = executor.run(request("stalled-tests"), CancellationToken::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.reason, TerminalReason::MaxIterationsReached);
    assert_eq!(outcome.iterations.len(), 3);
    for record in &outcome.iterations {
        assert_eq!(record.quality.overall, 0.0);
        assert!(record.quality.missing.contains(&Dimension::Coverage));
        assert!(!record.agent_failed);
    }
    // Two 2s attempts per iteration.
    assert!(elapsed >= Duration::from_secs(12), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(13), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_stalled_signal_is_cut_off_at_duration_ceiling() {
    let policy = HrmPolicy { max_duration_secs: 5, signal_timeout_secs: 600, ..policy() };
    let executor = executor(policy, Arc::new(StalledTests), Arc::new(MemoryStore::new()));

    let started = Instant::now();
    let outcome = executor.run(request("slow-tests"), CancellationToken::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.status(), TaskStatus::Failed);
    assert_eq!(outcome.reason, TerminalReason::DurationCeilingBreached);
    assert_eq!(outcome.iterations.len(), 1);
    assert_eq!(outcome.iterations[0].quality.overall, 0.0);
    assert!(elapsed >= Duration::from_secs(5), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "took {elapsed:?}");
}
