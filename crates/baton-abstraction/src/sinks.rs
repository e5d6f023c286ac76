//! Persistence and progress sinks.

use crate::records::{CostEntry, IterationRecord, SwitchEvent, SwitchReason, TerminalReason};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A record could not be written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The backend is unreachable or refused the write.
    #[error("Persistence backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the record itself.
    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// Durable, append-only history store.
///
/// Writes are awaited by the orchestrator; callers apply bounded retry.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Appends an iteration record.
    async fn append_iteration(&self, record: &IterationRecord) -> Result<(), PersistenceError>;

    /// Appends a switch event.
    async fn append_switch(&self, event: &SwitchEvent) -> Result<(), PersistenceError>;

    /// Appends a cost entry.
    async fn append_cost(&self, entry: &CostEntry) -> Result<(), PersistenceError>;
}

/// Best-effort notification about task progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// An iteration finished.
    Progress {
        /// Task ID.
        task_id: String,
        /// Iteration sequence number.
        iteration: u32,
        /// Agent that ran the iteration.
        agent_id: String,
        /// Quality measured.
        quality: f64,
        /// Accumulated task cost.
        total_cost: f64,
    },
    /// The active agent changed.
    AgentSwitched {
        /// Task ID.
        task_id: String,
        /// Agent replaced.
        from_agent: String,
        /// Agent taking over.
        to_agent: String,
        /// Reason code.
        reason: SwitchReason,
    },
    /// The task reached `completed`.
    Completed {
        /// Task ID.
        task_id: String,
        /// Reason code.
        reason: TerminalReason,
        /// Last measured quality.
        final_quality: f64,
        /// Accumulated task cost.
        total_cost: f64,
    },
    /// The task reached `failed`.
    Failed {
        /// Task ID.
        task_id: String,
        /// Reason code.
        reason: TerminalReason,
        /// Last measured quality.
        final_quality: f64,
        /// Accumulated task cost.
        total_cost: f64,
    },
    /// The task reached `cancelled`.
    Cancelled {
        /// Task ID.
        task_id: String,
        /// Accumulated task cost.
        total_cost: f64,
    },
}

impl ProgressEvent {
    /// Returns the task this event refers to.
    pub fn task_id(&self) -> &str {
        match self {
            Self::Progress { task_id, .. }
            | Self::AgentSwitched { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Cancelled { task_id, .. } => task_id,
        }
    }
}

/// Fire-and-forget progress notifications.
///
/// Implementations must not block; delivery is not guaranteed and the
/// orchestrator never depends on it.
pub trait ProgressSink: Send + Sync {
    /// Emits an event.
    fn notify(&self, event: ProgressEvent);
}
