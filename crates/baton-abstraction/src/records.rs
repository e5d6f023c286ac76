//! Append-only records produced while a task runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named quality dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Test suite passes.
    Tests,
    /// Line coverage.
    Coverage,
    /// Absence of security findings.
    Security,
    /// Absence of type errors.
    TypeSafety,
    /// Documentation coverage.
    Documentation,
}

impl Dimension {
    /// Every dimension, in scoring order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Tests,
        Dimension::Coverage,
        Dimension::Security,
        Dimension::TypeSafety,
        Dimension::Documentation,
    ];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tests => write!(f, "tests"),
            Self::Coverage => write!(f, "coverage"),
            Self::Security => write!(f, "security"),
            Self::TypeSafety => write!(f, "type_safety"),
            Self::Documentation => write!(f, "documentation"),
        }
    }
}

/// Scalar quality plus its per-dimension breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Weighted score in [0, 1].
    pub overall: f64,
    /// Sub-score per dimension, each in [0, 1]. Every dimension is present.
    pub breakdown: BTreeMap<Dimension, f64>,
    /// Test outcome, if the test signal was obtained.
    pub tests_passed: Option<bool>,
    /// Dimensions whose signal could not be obtained (scored 0).
    pub missing: Vec<Dimension>,
}

impl QualityScore {
    /// A score of zero on every dimension, used when no candidate was produced.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            overall: 0.0,
            breakdown: Dimension::ALL.iter().map(|d| (*d, 0.0)).collect(),
            tests_passed: None,
            missing: Dimension::ALL.to_vec(),
        }
    }
}

/// One executed refine step. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Task identifier.
    pub task_id: String,
    /// Sequence number, strictly increasing per task from 1.
    pub sequence: u32,
    /// Agent that ran this iteration.
    pub agent_id: String,
    /// Measured quality.
    pub quality: QualityScore,
    /// Tokens consumed.
    pub tokens_used: u64,
    /// Billed cost in USD.
    pub cost: f64,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Number of invocation attempts made.
    pub attempts: u32,
    /// True when every attempt failed and no candidate was produced.
    pub agent_failed: bool,
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

/// Why the active agent was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    /// Quality below the gate at a checkpoint.
    QualityGap,
    /// The active agent exhausted its retry budget.
    AgentExhausted,
    /// Quality regressed sharply between iterations.
    QualityDrop,
    /// Round-robin rotation.
    RoundRobin,
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QualityGap => write!(f, "quality_gap"),
            Self::AgentExhausted => write!(f, "agent_exhausted"),
            Self::QualityDrop => write!(f, "quality_drop"),
            Self::RoundRobin => write!(f, "round_robin"),
        }
    }
}

/// A policy decision that changed the active agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchEvent {
    /// Task identifier.
    pub task_id: String,
    /// Iteration after which the switch took effect.
    pub at_iteration: u32,
    /// Agent replaced.
    pub from_agent: String,
    /// Agent taking over.
    pub to_agent: String,
    /// Reason code.
    pub reason: SwitchReason,
    /// Gate threshold minus current quality at decision time.
    pub quality_gap: f64,
    /// Expected quality improvement of the new agent.
    pub quality_improvement: f64,
    /// Expected per-call cost difference of the new agent.
    pub cost_delta: f64,
    /// When the event was written.
    pub recorded_at: DateTime<Utc>,
}

/// Cost accounting line written once per iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    /// Task identifier.
    pub task_id: String,
    /// Iteration sequence number.
    pub sequence: u32,
    /// Agent billed.
    pub agent_id: String,
    /// Tokens consumed.
    pub tokens_used: u64,
    /// Cost of this iteration in USD.
    pub cost: f64,
    /// Task cost including this iteration.
    pub cumulative_cost: f64,
    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,
}

/// Reason code carried by every terminal task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Quality met the gate at a checkpoint.
    QualityGateMet,
    /// The iteration cap was reached; see final quality for the outcome.
    MaxIterationsReached,
    /// The cost ceiling was reached before the gate was met.
    CostCeilingBreached,
    /// The duration ceiling was reached before the gate was met.
    DurationCeilingBreached,
    /// An iteration exhausted its retries and no replacement agent was chosen.
    AgentsExhausted,
    /// History could not be persisted.
    PersistenceError,
    /// An external cancellation was honored.
    Cancelled,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::QualityGateMet => "quality_gate_met",
            Self::MaxIterationsReached => "max_iterations_reached",
            Self::CostCeilingBreached => "cost_ceiling_breached",
            Self::DurationCeilingBreached => "duration_ceiling_breached",
            Self::AgentsExhausted => "agents_exhausted",
            Self::PersistenceError => "persistence_error",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{code}")
    }
}
