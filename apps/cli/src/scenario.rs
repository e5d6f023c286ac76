//! Scenario files: scripted agents and task requests for offline runs.
//!
//! ```toml
//! [[agents]]
//! id = "eco"
//! cost = 1.0
//! capabilities = ["bulk"]
//! script = [0.60, 0.65]
//! prior = { cost = 1.0, quality = 0.6, latency_ms = 800.0 }
//!
//! [[tasks]]
//! request_ref = "CR-1"
//! signals = { estimated_loc = 10, labels = [] }
//! limits = { max_iterations = 6 }
//! ```
//!
//! Each script entry is the quality level the agent's patch reaches on that
//! call; the last entry repeats. The simulated signal provider turns that
//! level back into test, coverage, security, type and documentation
//! evidence.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use baton_abstraction::{
    AgentError, AgentOutput, Capability, CapabilitySet, DocReport, ExecutionAgent,
    SecurityReport, SignalError, SignalProvider, TaskContext, TestReport, TypeReport,
};
use baton_orchestrator::{Estimate, TaskRequest};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Prefix of every simulated patch.
const PATCH_PREFIX: &str = "simulated-patch quality=";

/// A scripted agent as written in the scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSpec {
    pub id: String,
    /// Billed cost per successful call.
    pub cost: f64,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Quality reached per call.
    pub script: Vec<f64>,
    /// Leading calls that fail before the script starts.
    #[serde(default)]
    pub failures: usize,
    #[serde(default = "default_tokens")]
    pub tokens: u64,
    /// Simulated call latency.
    #[serde(default)]
    pub latency_ms: u64,
    /// Starting estimate for the cost/quality model.
    pub prior: Option<Estimate>,
}

fn default_tokens() -> u64 {
    1_000
}

/// A parsed scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub tasks: Vec<TaskRequest>,
}

impl Scenario {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(content).context("Failed to parse scenario TOML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            bail!("Scenario declares no agents");
        }
        for agent in &self.agents {
            if agent.script.is_empty() {
                bail!("Agent '{}' has an empty script", agent.id);
            }
            if let Some(q) = agent.script.iter().find(|q| !(0.0..=1.0).contains(*q)) {
                bail!("Agent '{}' script value {} is outside [0, 1]", agent.id, q);
            }
            if !agent.cost.is_finite() || agent.cost < 0.0 {
                bail!("Agent '{}' has invalid cost {}", agent.id, agent.cost);
            }
        }
        Ok(())
    }
}

/// Agent that replays its scenario script.
pub struct ScriptedAgent {
    spec: AgentSpec,
    capabilities: CapabilitySet,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(spec: AgentSpec) -> Self {
        let capabilities = spec.capabilities.iter().copied().collect();
        Self { spec, capabilities, calls: AtomicUsize::new(0) }
    }

    /// Prior for the model: the scenario's, or the script's first step.
    pub fn prior(&self) -> Estimate {
        self.spec.prior.unwrap_or_else(|| {
            Estimate::prior(
                self.spec.cost,
                self.spec.script.first().copied().unwrap_or(0.0),
                self.spec.latency_ms as f64,
            )
        })
    }
}

#[async_trait]
impl ExecutionAgent for ScriptedAgent {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn invoke(&self, context: &TaskContext) -> Result<AgentOutput, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = Duration::from_millis(self.spec.latency_ms);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if call < self.spec.failures {
            return Err(AgentError::Unavailable {
                agent_id: self.spec.id.clone(),
                message: format!("scripted failure {} of {}", call + 1, self.spec.failures),
            });
        }
        let step = call - self.spec.failures;
        let quality = self
            .spec
            .script
            .get(step)
            .or_else(|| self.spec.script.last())
            .copied()
            .unwrap_or(0.0);

        Ok(AgentOutput {
            patch: format!("{PATCH_PREFIX}{quality} task={} iteration={}", context.task_id, context.iteration),
            tokens_used: self.spec.tokens,
            cost: self.spec.cost,
            duration: latency,
        })
    }
}

/// Derives quality evidence from a simulated patch.
///
/// Tests pass from 0.5 up, coverage and documentation track the level
/// directly, and one security finding and one type error appear below 0.7
/// and 0.6 respectively.
pub struct SimulatedSignals;

impl SimulatedSignals {
    fn level(patch: &str, signal: &str) -> Result<f64, SignalError> {
        patch
            .strip_prefix(PATCH_PREFIX)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|q| q.parse::<f64>().ok())
            .ok_or_else(|| SignalError::Failed {
                signal: signal.to_string(),
                message: "patch carries no simulated quality".to_string(),
            })
    }
}

#[async_trait]
impl SignalProvider for SimulatedSignals {
    async fn run_tests(&self, patch: &str) -> Result<TestReport, SignalError> {
        let level = Self::level(patch, "tests")?;
        Ok(TestReport { passing: level >= 0.5, coverage: level })
    }

    async fn scan_security(&self, patch: &str) -> Result<SecurityReport, SignalError> {
        let level = Self::level(patch, "security")?;
        Ok(SecurityReport { vulnerability_count: u32::from(level < 0.7) })
    }

    async fn check_types(&self, patch: &str) -> Result<TypeReport, SignalError> {
        let level = Self::level(patch, "types")?;
        Ok(TypeReport { error_count: u32::from(level < 0.6) })
    }

    async fn audit_docs(&self, patch: &str) -> Result<DocReport, SignalError> {
        let level = Self::level(patch, "docs")?;
        Ok(DocReport { documented_ratio: level })
    }
}
