//! Execution agent contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A capability tag advertised by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Produces high-quality changes; preferred for complex or risky work.
    Quality,
    /// Trusted with security-sensitive changes.
    Security,
    /// Suited to large mechanical changes.
    Bulk,
    /// Optimized for low latency.
    Fast,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quality => write!(f, "quality"),
            Self::Security => write!(f, "security"),
            Self::Bulk => write!(f, "bulk"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

/// Set of capability tags, ordered for deterministic display.
pub type CapabilitySet = BTreeSet<Capability>;

/// What an agent sees when it is asked to refine a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    /// Task identifier.
    pub task_id: String,
    /// Reference to the originating change request.
    pub request_ref: String,
    /// Free-form description of the requested change.
    pub description: String,
    /// Iteration sequence number being executed (1-based).
    pub iteration: u32,
    /// Patch produced by the previous iteration, if any.
    pub previous_patch: Option<String>,
    /// Quality measured on the previous iteration, if any.
    pub last_quality: Option<f64>,
    /// Budget left under the task's cost ceiling.
    pub remaining_budget: f64,
}

/// Output of a single agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// The candidate change.
    pub patch: String,
    /// Tokens consumed by the call.
    pub tokens_used: u64,
    /// Billed cost of the call in USD.
    pub cost: f64,
    /// Wall-clock duration reported by the agent.
    pub duration: Duration,
}

/// Transient failures an agent invocation can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// The agent backend could not accept the call.
    #[error("Agent '{agent_id}' unavailable: {message}")]
    Unavailable {
        /// Agent identifier.
        agent_id: String,
        /// Backend-supplied detail.
        message: String,
    },

    /// The call did not return within its per-call timeout.
    #[error("Agent '{agent_id}' timed out after {after:?}")]
    Timeout {
        /// Agent identifier.
        agent_id: String,
        /// Timeout that elapsed.
        after: Duration,
    },
}

/// An interchangeable executor that refines a change for a task.
///
/// Decision logic only ever looks at `id()` and `capabilities()`; the
/// internals of `invoke` are opaque to the orchestrator.
#[async_trait]
pub trait ExecutionAgent: Send + Sync {
    /// Returns the unique ID of the agent.
    fn id(&self) -> &str;

    /// Returns the capability tags this agent advertises.
    fn capabilities(&self) -> &CapabilitySet;

    /// Produces the next candidate change for the task.
    ///
    /// # Errors
    /// Returns an `AgentError` if the backend is unavailable or the call times out.
    async fn invoke(&self, context: &TaskContext) -> Result<AgentOutput, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::Timeout {
            agent_id: "sonnet".to_string(),
            after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "Agent 'sonnet' timed out after 2s");
    }
}
