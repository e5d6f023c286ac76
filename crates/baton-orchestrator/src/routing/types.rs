//! Types for task classification and routing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Complexity bucket assigned at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityBucket {
    /// Small, low-risk change.
    Simple,
    /// Everything between simple and complex.
    Medium,
    /// Large or high-risk change.
    Complex,
}

impl fmt::Display for ComplexityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplexityBucket::Simple => write!(f, "simple"),
            ComplexityBucket::Medium => write!(f, "medium"),
            ComplexityBucket::Complex => write!(f, "complex"),
        }
    }
}

/// Static signals available for a task before any agent runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignals {
    /// Estimated lines of change.
    #[serde(default)]
    pub estimated_loc: u32,
    /// Labels attached to the change request (e.g., "security").
    #[serde(default)]
    pub labels: Vec<String>,
    /// Description of the change request.
    #[serde(default)]
    pub description: String,
}

impl TaskSignals {
    /// Returns `true` if the task carries `label` (case-insensitive).
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.trim().eq_ignore_ascii_case(label))
    }
}

/// Why the router picked the starting agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteRationale {
    /// Complex or risky task sent to the best quality-capable agent.
    QualityCapable,
    /// Cheapest agent above the quality floor.
    CheapestAboveFloor,
    /// Winner of the cost-benefit test against the cheapest agent.
    CostBenefit,
    /// Fastest agent above the quality floor.
    Fastest,
    /// Highest expected quality.
    HighestQuality,
    /// First compatible agent in registration order.
    RegistrationOrder,
    /// Operator-selected default agent.
    Configured,
}

/// The router's choice for a new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Starting agent.
    pub agent_id: String,
    /// Why it was chosen.
    pub rationale: RouteRationale,
}
