//! Task lifecycle states.
//!
//! Status only moves forward: `Pending -> Running -> {Completed, Failed, Cancelled}`.
//! A task may also be dropped straight from `Pending` to `Failed` or `Cancelled`
//! before its first iteration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted, not yet iterating.
    Pending,
    /// Iterating.
    Running,
    /// Stopped after meeting the gate or reaching the iteration cap.
    Completed,
    /// Stopped on a ceiling breach or unrecoverable error.
    Failed,
    /// Stopped on external request.
    Cancelled,
}

impl TaskStatus {
    /// Checks if the task can transition to the given state.
    ///
    /// # Arguments
    /// * `to` - The target state
    ///
    /// # Returns
    /// Returns `true` if the transition is valid, `false` otherwise.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm represents a distinct state transition rule
    pub fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            // From Pending: start running, or be dropped before the first iteration
            (Self::Pending, Self::Running | Self::Failed | Self::Cancelled) => true,
            // From Running: any terminal state
            (Self::Running, Self::Completed | Self::Failed | Self::Cancelled) => true,
            // Terminal states are never left or re-entered
            _ => false,
        }
    }

    /// Returns `true` once the task has stopped.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
