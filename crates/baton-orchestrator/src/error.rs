// Error types for orchestration

use crate::lifecycle::TaskStatus;
use crate::policy::PolicyError;
use crate::registry::RegistryError;
use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Orchestration errors.
///
/// These are surfaced synchronously to the caller. A task that was admitted
/// and later stops for a runtime reason reports that through its
/// `TaskOutcome`, not through this type.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Policy failed validation or could not be obtained
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Registry rejected an operation
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// No agents are registered
    #[error("No agents registered")]
    NoAgents,

    /// No registered agent satisfies the task's capability requirements
    #[error("No registered agent provides capabilities [{required}]")]
    NoCompatibleAgent {
        /// Required capability tags, comma separated
        required: String,
    },

    /// A task status transition was attempted out of order
    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Task ID
        task_id: String,
        /// Current status
        from: TaskStatus,
        /// Requested status
        to: TaskStatus,
    },

    /// The background task running an orchestration loop died
    #[error("Task runner failed: {0}")]
    Runner(String),
}
