//! Shared fixtures: scripted agents, patch-derived signals and a wired executor.

#![allow(dead_code)]

use async_trait::async_trait;
use baton_abstraction::{
    AgentError, AgentOutput, Capability, CapabilitySet, Dimension, DocReport, ExecutionAgent,
    SecurityReport, SignalError, SignalProvider, TaskContext, TestReport, TypeReport,
};
use baton_orchestrator::{
    AgentRegistry, CostQualityModel, Estimate, HrmPolicy, MemoryStore, PolicyStore,
    ProgressReporter, QualityWeights, RetryPolicy, TaskExecutor, TaskRequest, TaskSignals,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a scripted agent does on one call.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Returns a patch whose coverage signal is this value.
    Coverage(f64),
    /// Never answers within any sane timeout.
    Hang,
    /// Fails fast with `AgentUnavailable`.
    Unavailable,
}

/// Agent that replays a script, one step per call. The last step repeats.
pub struct ScriptedAgent {
    id: String,
    capabilities: CapabilitySet,
    cost: f64,
    script: Vec<Step>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedAgent {
    pub fn new(id: &str, cost: f64, script: Vec<Step>) -> Self {
        Self {
            id: id.to_string(),
            capabilities: CapabilitySet::new(),
            cost,
            script,
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Agent returning the given coverages in order.
    pub fn sequence(id: &str, cost: f64, coverages: &[f64]) -> Self {
        Self::new(id, cost, coverages.iter().map(|c| Step::Coverage(*c)).collect())
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.iter().copied().collect();
        self
    }

    /// Sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionAgent for ScriptedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn invoke(&self, _context: &TaskContext) -> Result<AgentOutput, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(Step::Unavailable);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match step {
            Step::Coverage(coverage) => Ok(AgentOutput {
                patch: coverage.to_string(),
                tokens_used: 1_000,
                cost: self.cost,
                duration: Duration::from_millis(50),
            }),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3_600)).await;
                Err(AgentError::Unavailable {
                    agent_id: self.id.clone(),
                    message: "woke up".to_string(),
                })
            }
            Step::Unavailable => Err(AgentError::Unavailable {
                agent_id: self.id.clone(),
                message: "scripted outage".to_string(),
            }),
        }
    }
}

/// Signals read straight from the patch: coverage is the patch text.
pub struct PatchSignals;

#[async_trait]
impl SignalProvider for PatchSignals {
    async fn run_tests(&self, patch: &str) -> Result<TestReport, SignalError> {
        let coverage: f64 = patch
            .parse()
            .map_err(|_| SignalError::Failed { signal: "tests".to_string(), message: patch.to_string() })?;
        Ok(TestReport { passing: coverage >= 0.5, coverage })
    }

    async fn scan_security(&self, _patch: &str) -> Result<SecurityReport, SignalError> {
        Ok(SecurityReport { vulnerability_count: 0 })
    }

    async fn check_types(&self, _patch: &str) -> Result<TypeReport, SignalError> {
        Ok(TypeReport { error_count: 0 })
    }

    async fn audit_docs(&self, _patch: &str) -> Result<DocReport, SignalError> {
        Ok(DocReport { documented_ratio: 1.0 })
    }
}

/// Policy where quality equals the coverage signal and retries do not wait.
pub fn policy() -> HrmPolicy {
    HrmPolicy {
        weights: QualityWeights::only(Dimension::Coverage),
        retry: RetryPolicy::immediate(),
        ..HrmPolicy::default()
    }
}

/// A medium-sized request with no labels.
pub fn request(name: &str) -> TaskRequest {
    TaskRequest::new(
        name,
        TaskSignals {
            estimated_loc: 120,
            labels: Vec::new(),
            description: format!("change for {name}"),
        },
    )
}

/// An executor wired to in-memory collaborators.
pub struct Harness {
    pub executor: Arc<TaskExecutor>,
    pub registry: Arc<AgentRegistry>,
    pub model: Arc<CostQualityModel>,
    pub store: Arc<MemoryStore>,
    pub progress: Arc<ProgressReporter>,
    pub policies: Arc<PolicyStore>,
}

impl Harness {
    /// Registers `agents` in order, seeding each with its prior.
    pub fn new(policy: HrmPolicy, agents: Vec<(Arc<ScriptedAgent>, Estimate)>) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        let model = Arc::new(CostQualityModel::default());
        for (agent, prior) in agents {
            model.seed(agent.id(), prior);
            registry.register(agent).unwrap();
        }
        let store = Arc::new(MemoryStore::new());
        let progress = Arc::new(ProgressReporter::new());
        let policies = Arc::new(PolicyStore::new(policy).unwrap());
        let executor = Arc::new(TaskExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&model),
            Arc::new(PatchSignals),
            store.clone(),
            progress.clone(),
            policies.clone(),
        ));
        Self { executor, registry, model, store, progress, policies }
    }
}
