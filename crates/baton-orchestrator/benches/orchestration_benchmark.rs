//! Performance benchmarks for the orchestration loop.
//!
//! Measures decision overhead with agents and signal providers that answer
//! immediately, so the numbers reflect orchestration logic only:
//! - checkpoint schedule computation
//! - one switch decision across a fleet of candidates
//! - a full nine-iteration task with two switches

use async_trait::async_trait;
use baton_abstraction::{
    AgentError, AgentOutput, Capability, CapabilitySet, DocReport, ExecutionAgent, SecurityReport,
    SignalError, SignalProvider, TaskContext, TestReport, TypeReport,
};
use baton_orchestrator::{
    AgentProfile, CheckpointSchedule, CostQualityModel, Estimate, HrmPolicy, MemoryStore,
    NullProgress, PolicyStore, SwitchContext, SwitchDecisionEngine, SwitchTrigger, TaskExecutor,
    TaskRequest, TaskSignals,
};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Agent that answers immediately with a fixed coverage in its patch.
struct InstantAgent {
    id: String,
    capabilities: CapabilitySet,
    coverage: f64,
}

#[async_trait]
impl ExecutionAgent for InstantAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn invoke(&self, _context: &TaskContext) -> Result<AgentOutput, AgentError> {
        Ok(AgentOutput {
            patch: self.coverage.to_string(),
            tokens_used: 1_000,
            cost: 0.01,
            duration: Duration::from_millis(1),
        })
    }
}

/// Signals derived from the patch text.
struct PatchSignals;

#[async_trait]
impl SignalProvider for PatchSignals {
    async fn run_tests(&self, patch: &str) -> Result<TestReport, SignalError> {
        let coverage = patch.parse().unwrap_or(0.0);
        Ok(TestReport { passing: true, coverage })
    }

    async fn scan_security(&self, _patch: &str) -> Result<SecurityReport, SignalError> {
        Ok(SecurityReport { vulnerability_count: 0 })
    }

    async fn check_types(&self, _patch: &str) -> Result<TypeReport, SignalError> {
        Ok(TypeReport { error_count: 0 })
    }

    async fn audit_docs(&self, _patch: &str) -> Result<DocReport, SignalError> {
        Ok(DocReport { documented_ratio: 0.5 })
    }
}

fn benchmark_checkpoint_schedule(c: &mut Criterion) {
    let fractions = [0.1, 0.25, 0.33, 0.5, 0.66, 0.75, 1.0];
    c.bench_function("checkpoint_schedule_compute", |b| {
        b.iter(|| black_box(CheckpointSchedule::compute(black_box(90), &fractions)));
    });
}

fn benchmark_switch_decision(c: &mut Criterion) {
    let policy = HrmPolicy::default();
    let model = CostQualityModel::default();
    let candidates: Vec<AgentProfile> = (0..32)
        .map(|i| {
            let id = format!("agent-{i}");
            model.seed(&id, Estimate::prior(0.1 * f64::from(i + 1), 0.3 + 0.02 * f64::from(i), 1_000.0));
            AgentProfile { id, capabilities: CapabilitySet::new(), order: i as usize }
        })
        .collect();

    c.bench_function("switch_decision_32_candidates", |b| {
        let engine = SwitchDecisionEngine::new(&policy, &model);
        b.iter(|| {
            let context = SwitchContext {
                current_agent: "agent-0",
                current_quality: 0.4,
                remaining_budget: 100.0,
                switches_remaining: 2,
                trigger: SwitchTrigger::Checkpoint,
                candidates: &candidates,
            };
            black_box(engine.decide(black_box(&context)))
        });
    });
}

fn benchmark_full_task(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("orchestration_full_task_overhead", |b| {
        b.iter(|| {
            rt.block_on(async {
                let registry = Arc::new(baton_orchestrator::AgentRegistry::new());
                for (id, coverage, caps) in [
                    ("bulk", 0.4, vec![Capability::Bulk]),
                    ("mid", 0.6, vec![Capability::Quality]),
                    ("best", 0.8, vec![Capability::Quality]),
                ] {
                    registry
                        .register(Arc::new(InstantAgent {
                            id: id.to_string(),
                            capabilities: caps.into_iter().collect(),
                            coverage,
                        }))
                        .unwrap();
                }
                let policy = HrmPolicy { quality_gate_threshold: 0.99, ..HrmPolicy::default() };
                let executor = TaskExecutor::new(
                    registry,
                    Arc::new(CostQualityModel::default()),
                    Arc::new(PatchSignals),
                    Arc::new(MemoryStore::new()),
                    Arc::new(NullProgress),
                    Arc::new(PolicyStore::new(policy).unwrap()),
                );
                let request = TaskRequest::new(
                    "bench",
                    TaskSignals { estimated_loc: 10, ..TaskSignals::default() },
                );
                black_box(executor.run(request, CancellationToken::new()).await.unwrap());
            });
        });
    });
}

criterion_group!(
    benches,
    benchmark_checkpoint_schedule,
    benchmark_switch_decision,
    benchmark_full_task
);
criterion_main!(benches);
