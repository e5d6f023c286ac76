//! Task state, requests and outcomes.

use crate::error::{OrchestrationError, Result};
use crate::lifecycle::TaskStatus;
use crate::policy::HrmPolicy;
use crate::routing::{ComplexityBucket, TaskSignals};
use crate::switching::SwitchPlan;
use baton_abstraction::{Capability, CapabilitySet, IterationRecord, SwitchEvent, TerminalReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Per-task overrides of the policy's resource ceilings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskLimits {
    /// Iteration cap.
    pub max_iterations: Option<u32>,
    /// Cost ceiling in USD.
    pub max_cost: Option<f64>,
    /// Duration ceiling in seconds.
    pub max_duration_secs: Option<u64>,
}

impl TaskLimits {
    /// Returns `policy` with these overrides applied.
    #[must_use]
    pub fn apply(&self, policy: &HrmPolicy) -> HrmPolicy {
        HrmPolicy {
            max_iterations: self.max_iterations.unwrap_or(policy.max_iterations),
            max_cost: self.max_cost.unwrap_or(policy.max_cost),
            max_duration_secs: self.max_duration_secs.unwrap_or(policy.max_duration_secs),
            ..policy.clone()
        }
    }
}

/// A unit of work submitted for orchestration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Reference to the originating change request.
    pub request_ref: String,
    /// Policy scope (project or task key). Empty means the default scope.
    #[serde(default)]
    pub scope: String,
    /// Static signals for classification.
    #[serde(default)]
    pub signals: TaskSignals,
    /// Ceiling overrides.
    #[serde(default)]
    pub limits: TaskLimits,
}

impl TaskRequest {
    /// Creates a request in the default scope.
    #[must_use]
    pub fn new(request_ref: impl Into<String>, signals: TaskSignals) -> Self {
        Self { request_ref: request_ref.into(), signals, ..Self::default() }
    }

    /// Capabilities an agent must provide to work on this task.
    #[must_use]
    pub fn required_capabilities(&self) -> CapabilitySet {
        let mut required = CapabilitySet::new();
        if self.signals.has_label("security") {
            required.insert(Capability::Security);
        }
        required
    }
}

/// One unit of work. Mutated only by the executor running it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    /// Unique task ID.
    pub id: String,
    /// Originating request reference.
    pub request_ref: String,
    /// Complexity bucket assigned at admission.
    pub complexity: ComplexityBucket,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Completed iterations.
    pub iteration: u32,
    /// Iteration cap.
    pub max_iterations: u32,
    /// Cost ceiling in USD.
    pub max_cost: f64,
    /// Duration ceiling.
    #[serde(with = "duration_secs")]
    pub max_duration: Duration,
    /// Cost spent so far.
    pub accumulated_cost: f64,
    /// Active agent.
    pub current_agent: String,
    /// Capabilities every assigned agent must provide.
    pub required_capabilities: CapabilitySet,
    /// Switches made so far.
    pub switches_used: u32,
    /// Admission time.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Creates a pending task.
    #[must_use]
    pub fn new(
        request: &TaskRequest,
        complexity: ComplexityBucket,
        policy: &HrmPolicy,
        agent_id: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_ref: request.request_ref.clone(),
            complexity,
            status: TaskStatus::Pending,
            iteration: 0,
            max_iterations: policy.max_iterations,
            max_cost: policy.max_cost,
            max_duration: policy.max_duration(),
            accumulated_cost: 0.0,
            current_agent: agent_id,
            required_capabilities: request.required_capabilities(),
            switches_used: 0,
            created_at: Utc::now(),
        }
    }

    /// Moves the task to `to`.
    ///
    /// # Errors
    /// Returns [`OrchestrationError::InvalidTransition`] for a backward or
    /// repeated transition.
    pub fn transition(&mut self, to: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(OrchestrationError::InvalidTransition {
                task_id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        debug!(task_id = %self.id, from = %self.status, to = %to, "Task status transition");
        self.status = to;
        Ok(())
    }

    /// Budget left under the cost ceiling.
    #[must_use]
    pub fn remaining_budget(&self) -> f64 {
        (self.max_cost - self.accumulated_cost).max(0.0)
    }
}

/// Terminal result of a task, including partial history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    /// Final task state.
    pub task: Task,
    /// Why the task stopped.
    pub reason: TerminalReason,
    /// Quality of the last completed iteration (0 if none ran).
    pub final_quality: f64,
    /// Cost spent.
    pub total_cost: f64,
    /// Every recorded iteration, in order.
    pub iterations: Vec<IterationRecord>,
    /// Every switch made, in order.
    pub switch_events: Vec<SwitchEvent>,
    /// Switches recommended but not made (manual strategy).
    pub recommendations: Vec<SwitchPlan>,
}

impl TaskOutcome {
    /// Final status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.task.status
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}
