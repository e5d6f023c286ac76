//! Task executor: the orchestration loop.
//!
//! One call to [`TaskExecutor::run`] drives one task from admission to a
//! terminal state:
//!
//! ```text
//! admit -> { invoke agent -> evaluate -> record -> update model
//!            -> ceilings -> [checkpoint] switch decision } -> terminal
//! ```
//!
//! Tasks are isolated from one another. The only shared state is the agent
//! registry and the cost/quality model, both safe for concurrent use.

use crate::checkpoint::CheckpointSchedule;
use crate::cost_model::{CostQualityModel, Observation};
use crate::error::{OrchestrationError, Result};
use crate::lifecycle::TaskStatus;
use crate::persistence::persist_with_retry;
use crate::policy::{HrmPolicy, PolicySource};
use crate::quality::QualityEvaluator;
use crate::registry::AgentRegistry;
use crate::routing::{ComplexityClassifier, Router};
use crate::switching::{SwitchContext, SwitchDecision, SwitchDecisionEngine, SwitchPlan, SwitchTrigger};
use crate::task::{Task, TaskLimits, TaskOutcome, TaskRequest};
use baton_abstraction::{
    AgentError, AgentOutput, CostEntry, ExecutionAgent, IterationRecord, PersistenceError,
    PersistenceSink, ProgressEvent, ProgressSink, QualityScore, SignalProvider, SwitchEvent,
    TaskContext, TerminalReason,
};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scope used when a request names none.
pub const DEFAULT_SCOPE: &str = "default";

/// A task that passed admission and is ready to run.
#[derive(Debug, Clone)]
pub struct AdmittedTask {
    task: Task,
    policy: Arc<HrmPolicy>,
    revision: u64,
    request: TaskRequest,
    scope: String,
}

impl AdmittedTask {
    /// The pending task.
    #[must_use]
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Effective policy snapshot, limits applied.
    #[must_use]
    pub fn policy(&self) -> &HrmPolicy {
        &self.policy
    }

    /// Revision of the policy snapshot.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Result of invoking the active agent for one iteration.
enum Invocation {
    Completed { output: AgentOutput, attempts: u32 },
    Exhausted { attempts: u32, elapsed: Duration },
    Cancelled,
}

/// Mutable state of one running task.
struct TaskRun {
    task: Task,
    request: TaskRequest,
    scope: String,
    policy: Arc<HrmPolicy>,
    revision: u64,
    schedule: CheckpointSchedule,
    evaluator: QualityEvaluator,
    iterations: Vec<IterationRecord>,
    switch_events: Vec<SwitchEvent>,
    recommendations: Vec<SwitchPlan>,
    last_patch: Option<String>,
    started: Instant,
}

/// Drives tasks through the refine/evaluate loop.
pub struct TaskExecutor {
    registry: Arc<AgentRegistry>,
    model: Arc<CostQualityModel>,
    signals: Arc<dyn SignalProvider>,
    persistence: Arc<dyn PersistenceSink>,
    progress: Arc<dyn ProgressSink>,
    policies: Arc<dyn PolicySource>,
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("registry", &self.registry)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl TaskExecutor {
    /// Creates an executor over its collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<AgentRegistry>,
        model: Arc<CostQualityModel>,
        signals: Arc<dyn SignalProvider>,
        persistence: Arc<dyn PersistenceSink>,
        progress: Arc<dyn ProgressSink>,
        policies: Arc<dyn PolicySource>,
    ) -> Self {
        Self { registry, model, signals, persistence, progress, policies }
    }

    /// Admits and runs a task to completion.
    ///
    /// # Errors
    /// Returns an error only if admission fails. Every runtime stop,
    /// failures included, is reported through the returned [`TaskOutcome`].
    pub async fn run(&self, request: TaskRequest, cancel: CancellationToken) -> Result<TaskOutcome> {
        let admitted = self.admit(request).await?;
        Ok(self.execute(admitted, cancel).await)
    }

    /// Validates a request and picks its starting agent.
    ///
    /// # Errors
    /// Returns an error if the policy is unavailable or invalid, or no
    /// registered agent can take the task.
    pub async fn admit(&self, request: TaskRequest) -> Result<AdmittedTask> {
        let scope = if request.scope.is_empty() {
            DEFAULT_SCOPE.to_string()
        } else {
            request.scope.clone()
        };
        let snapshot = self.policies.get_policy(&scope).await?;
        let policy = request.limits.apply(&snapshot.policy);
        policy.validate()?;

        if self.registry.is_empty() {
            return Err(OrchestrationError::NoAgents);
        }
        let required = request.required_capabilities();
        let candidates = self.registry.compatible(&required);

        let classifier = ComplexityClassifier::new(policy.classifier.clone());
        let bucket = classifier.classify(&request.signals);
        let high_risk = classifier.is_high_risk(&request.signals);

        let decision = Router::new(&policy, &self.model)
            .route(bucket, high_risk, &candidates)
            .ok_or_else(|| OrchestrationError::NoCompatibleAgent {
                required: required.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
            })?;

        let task = Task::new(&request, bucket, &policy, decision.agent_id);
        info!(
            task_id = %task.id,
            request_ref = %task.request_ref,
            complexity = %bucket,
            agent_id = %task.current_agent,
            rationale = ?decision.rationale,
            strategy = %policy.strategy,
            revision = snapshot.revision,
            "Admitted task"
        );

        Ok(AdmittedTask {
            task,
            policy: Arc::new(policy),
            revision: snapshot.revision,
            request,
            scope,
        })
    }

    /// Runs an admitted task to a terminal state.
    pub async fn execute(&self, admitted: AdmittedTask, cancel: CancellationToken) -> TaskOutcome {
        let AdmittedTask { task, policy, revision, request, scope } = admitted;
        let mut run = TaskRun {
            schedule: CheckpointSchedule::compute(task.max_iterations, &policy.checkpoints),
            evaluator: QualityEvaluator::new(
                Arc::clone(&self.signals),
                policy.weights.clone(),
                policy.signal_attempts,
                policy.signal_timeout(),
            ),
            task,
            request,
            scope,
            policy,
            revision,
            iterations: Vec::new(),
            switch_events: Vec::new(),
            recommendations: Vec::new(),
            last_patch: None,
            started: Instant::now(),
        };

        if let Err(e) = run.task.transition(TaskStatus::Running) {
            error!(error = %e, "Illegal start transition");
        }
        debug!(
            task_id = %run.task.id,
            checkpoints = ?run.schedule.indices(),
            "Task running"
        );

        loop {
            if cancel.is_cancelled() {
                return self.finish(run, TaskStatus::Cancelled, TerminalReason::Cancelled);
            }
            if run.started.elapsed() >= run.task.max_duration {
                return self.finish(run, TaskStatus::Failed, TerminalReason::DurationCeilingBreached);
            }

            let sequence = run.task.iteration + 1;
            let agent_id = run.task.current_agent.clone();

            let expected = self.model.estimate(&agent_id);
            if run.task.accumulated_cost + expected.cost > run.task.max_cost {
                warn!(
                    task_id = %run.task.id,
                    agent_id = %agent_id,
                    accumulated_cost = run.task.accumulated_cost,
                    expected_cost = expected.cost,
                    max_cost = run.task.max_cost,
                    "Next iteration would exceed the cost ceiling"
                );
                return self.finish(run, TaskStatus::Failed, TerminalReason::CostCeilingBreached);
            }

            let (quality, output, attempts, elapsed) =
                match self.invoke(&run, sequence, &agent_id, &cancel).await {
                    Invocation::Completed { output, attempts } => {
                        let remaining = run.task.max_duration.saturating_sub(run.started.elapsed());
                        let quality = run.evaluator.evaluate(&output.patch, remaining).await;
                        let elapsed = output.duration;
                        (quality, Some(output), attempts, elapsed)
                    }
                    Invocation::Exhausted { attempts, elapsed } => {
                        (QualityScore::zero(), None, attempts, elapsed)
                    }
                    Invocation::Cancelled => {
                        return self.finish(run, TaskStatus::Cancelled, TerminalReason::Cancelled);
                    }
                };
            let agent_failed = output.is_none();
            let cost = output.as_ref().map_or(0.0, |o| o.cost.max(0.0));
            let tokens_used = output.as_ref().map_or(0, |o| o.tokens_used);

            run.task.iteration = sequence;
            run.task.accumulated_cost += cost;

            let record = IterationRecord {
                task_id: run.task.id.clone(),
                sequence,
                agent_id: agent_id.clone(),
                quality,
                tokens_used,
                cost,
                duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                attempts,
                agent_failed,
                recorded_at: Utc::now(),
            };
            let entry = CostEntry {
                task_id: run.task.id.clone(),
                sequence,
                agent_id: agent_id.clone(),
                tokens_used,
                cost,
                cumulative_cost: run.task.accumulated_cost,
                recorded_at: record.recorded_at,
            };
            let quality = record.quality.overall;
            let persisted = self.persist_iteration(&run.policy, &record, &entry).await;
            run.iterations.push(record);
            if let Some(output) = output {
                self.model.observe(
                    &agent_id,
                    Observation {
                        cost,
                        quality,
                        latency_ms: elapsed.as_secs_f64() * 1_000.0,
                    },
                    run.policy.ewma_alpha,
                );
                run.last_patch = Some(output.patch);
            } else {
                self.model.observe_failure(&agent_id, run.policy.ewma_alpha);
            }
            if let Err(e) = persisted {
                error!(task_id = %run.task.id, sequence, error = %e, "Iteration could not be persisted");
                return self.finish(run, TaskStatus::Failed, TerminalReason::PersistenceError);
            }

            debug!(
                task_id = %run.task.id,
                iteration = sequence,
                agent_id = %agent_id,
                quality,
                cost,
                accumulated_cost = run.task.accumulated_cost,
                agent_failed,
                "Iteration recorded"
            );
            self.progress.notify(ProgressEvent::Progress {
                task_id: run.task.id.clone(),
                iteration: sequence,
                agent_id: agent_id.clone(),
                quality,
                total_cost: run.task.accumulated_cost,
            });

            let at_checkpoint = run.schedule.contains(sequence);
            if at_checkpoint {
                self.refresh_policy(&mut run).await;
            }
            let is_final = sequence >= run.task.max_iterations;

            if !agent_failed
                && at_checkpoint
                && quality >= run.policy.quality_gate_threshold
                && (run.policy.stop_on_quality_gate || is_final)
            {
                return self.finish(run, TaskStatus::Completed, TerminalReason::QualityGateMet);
            }
            if run.task.accumulated_cost >= run.task.max_cost {
                return self.finish(run, TaskStatus::Failed, TerminalReason::CostCeilingBreached);
            }
            if run.started.elapsed() >= run.task.max_duration {
                return self.finish(run, TaskStatus::Failed, TerminalReason::DurationCeilingBreached);
            }
            if is_final {
                return self.finish(run, TaskStatus::Completed, TerminalReason::MaxIterationsReached);
            }

            let previous_quality = run
                .iterations
                .len()
                .checked_sub(2)
                .and_then(|i| run.iterations.get(i))
                .map(|r| r.quality.overall);
            let trigger = if agent_failed {
                Some(SwitchTrigger::AgentExhausted)
            } else if previous_quality
                .is_some_and(|previous| previous - quality > run.policy.quality_drop_threshold)
            {
                Some(SwitchTrigger::QualityDrop)
            } else if at_checkpoint {
                Some(SwitchTrigger::Checkpoint)
            } else {
                None
            };
            let Some(trigger) = trigger else {
                continue;
            };

            let candidates = self.registry.compatible(&run.task.required_capabilities);
            let context = SwitchContext {
                current_agent: &agent_id,
                current_quality: quality,
                remaining_budget: run.task.remaining_budget(),
                switches_remaining: run
                    .policy
                    .max_switches_per_task
                    .saturating_sub(run.task.switches_used),
                trigger,
                candidates: &candidates,
            };
            let decision = SwitchDecisionEngine::new(&run.policy, &self.model).decide(&context);

            match decision {
                SwitchDecision::Switch(plan) => {
                    if let Err(e) = self.apply_switch(&mut run, plan).await {
                        error!(task_id = %run.task.id, error = %e, "Switch event could not be persisted");
                        return self.finish(run, TaskStatus::Failed, TerminalReason::PersistenceError);
                    }
                }
                SwitchDecision::Recommend(plan) => {
                    warn!(
                        task_id = %run.task.id,
                        iteration = sequence,
                        from_agent = %agent_id,
                        to_agent = %plan.to_agent,
                        reason = %plan.reason,
                        quality_gap = plan.quality_gap,
                        "Manual strategy: switch recommended, not applied"
                    );
                    run.recommendations.push(plan);
                    if agent_failed {
                        return self.finish(run, TaskStatus::Failed, TerminalReason::AgentsExhausted);
                    }
                }
                SwitchDecision::Keep(reason) => {
                    debug!(task_id = %run.task.id, iteration = sequence, ?reason, "Keeping agent");
                    if agent_failed {
                        return self.finish(run, TaskStatus::Failed, TerminalReason::AgentsExhausted);
                    }
                }
            }
        }
    }

    /// Invokes the active agent with per-call timeouts and backoff between
    /// attempts.
    async fn invoke(
        &self,
        run: &TaskRun,
        sequence: u32,
        agent_id: &str,
        cancel: &CancellationToken,
    ) -> Invocation {
        let started = Instant::now();
        let Some(agent) = self.registry.get(agent_id) else {
            warn!(task_id = %run.task.id, agent_id, "Active agent is not registered");
            return Invocation::Exhausted { attempts: 0, elapsed: Duration::ZERO };
        };

        let context = TaskContext {
            task_id: run.task.id.clone(),
            request_ref: run.request.request_ref.clone(),
            description: run.request.signals.description.clone(),
            iteration: sequence,
            previous_patch: run.last_patch.clone(),
            last_quality: run.iterations.last().map(|r| r.quality.overall),
            remaining_budget: run.task.remaining_budget(),
        };

        let max_attempts = run.policy.max_agent_attempts.max(1);
        let mut attempts = 0;
        for attempt in 1..=max_attempts {
            let remaining = run.task.max_duration.saturating_sub(run.started.elapsed());
            let limit = run.policy.agent_timeout().min(remaining);
            if limit.is_zero() {
                break;
            }
            attempts = attempt;

            let error = match call_with_timeout(agent.as_ref(), &context, limit).await {
                Ok(output) => return Invocation::Completed { output, attempts: attempt },
                Err(e) => e,
            };
            warn!(
                task_id = %run.task.id,
                agent_id,
                iteration = sequence,
                attempt,
                max_attempts,
                error = %error,
                "Agent call failed"
            );

            if attempt < max_attempts {
                let delay = run.policy.retry.calculate_delay(attempt - 1);
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!(task_id = %run.task.id, "Cancelled during agent retry backoff");
                        return Invocation::Cancelled;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        warn!(task_id = %run.task.id, agent_id, iteration = sequence, "Agent exhausted its retry budget");
        Invocation::Exhausted { attempts, elapsed: started.elapsed() }
    }

    async fn persist_iteration(
        &self,
        policy: &HrmPolicy,
        record: &IterationRecord,
        entry: &CostEntry,
    ) -> std::result::Result<(), PersistenceError> {
        let sink = &self.persistence;
        let (attempts, timeout) = (policy.persistence_attempts, policy.persistence_timeout());
        persist_with_retry("iteration", attempts, timeout, &policy.retry, || {
            sink.append_iteration(record)
        })
        .await?;
        persist_with_retry("cost", attempts, timeout, &policy.retry, || sink.append_cost(entry))
            .await
    }

    async fn apply_switch(
        &self,
        run: &mut TaskRun,
        plan: SwitchPlan,
    ) -> std::result::Result<(), PersistenceError> {
        let event = SwitchEvent {
            task_id: run.task.id.clone(),
            at_iteration: run.task.iteration,
            from_agent: run.task.current_agent.clone(),
            to_agent: plan.to_agent,
            reason: plan.reason,
            quality_gap: plan.quality_gap,
            quality_improvement: plan.quality_improvement,
            cost_delta: plan.cost_delta,
            recorded_at: Utc::now(),
        };
        let sink = &self.persistence;
        persist_with_retry(
            "switch",
            run.policy.persistence_attempts,
            run.policy.persistence_timeout(),
            &run.policy.retry,
            || sink.append_switch(&event),
        )
        .await?;

        info!(
            task_id = %event.task_id,
            iteration = event.at_iteration,
            from_agent = %event.from_agent,
            to_agent = %event.to_agent,
            reason = %event.reason,
            quality_gap = event.quality_gap,
            quality_improvement = event.quality_improvement,
            cost_delta = event.cost_delta,
            "Switched agent"
        );
        self.progress.notify(ProgressEvent::AgentSwitched {
            task_id: event.task_id.clone(),
            from_agent: event.from_agent.clone(),
            to_agent: event.to_agent.clone(),
            reason: event.reason,
        });

        run.task.switches_used += 1;
        run.task.current_agent.clone_from(&event.to_agent);
        run.switch_events.push(event);
        Ok(())
    }

    /// Adopts a newer policy published with `apply_to_active`. Task ceilings
    /// stay as admitted.
    async fn refresh_policy(&self, run: &mut TaskRun) {
        let snapshot = match self.policies.get_policy(&run.scope).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(task_id = %run.task.id, scope = %run.scope, error = %e, "Policy refresh failed");
                return;
            }
        };
        if snapshot.revision <= run.revision {
            return;
        }
        if !snapshot.apply_to_active {
            debug!(
                task_id = %run.task.id,
                revision = snapshot.revision,
                "Newer policy applies to new tasks only"
            );
            return;
        }

        let limits = TaskLimits {
            max_iterations: Some(run.task.max_iterations),
            max_cost: Some(run.task.max_cost),
            max_duration_secs: Some(run.policy.max_duration_secs),
        };
        let policy = limits.apply(&snapshot.policy);
        if let Err(e) = policy.validate() {
            warn!(task_id = %run.task.id, revision = snapshot.revision, error = %e, "Ignoring invalid policy update");
            return;
        }

        run.schedule = CheckpointSchedule::compute(run.task.max_iterations, &policy.checkpoints);
        run.evaluator = QualityEvaluator::new(
            Arc::clone(&self.signals),
            policy.weights.clone(),
            policy.signal_attempts,
            policy.signal_timeout(),
        );
        info!(
            task_id = %run.task.id,
            from_revision = run.revision,
            to_revision = snapshot.revision,
            strategy = %policy.strategy,
            checkpoints = ?run.schedule.indices(),
            "Applied policy update to running task"
        );
        run.policy = Arc::new(policy);
        run.revision = snapshot.revision;
    }

    fn finish(&self, mut run: TaskRun, status: TaskStatus, reason: TerminalReason) -> TaskOutcome {
        if let Err(e) = run.task.transition(status) {
            error!(error = %e, "Illegal terminal transition");
        }
        let final_quality = run.iterations.last().map_or(0.0, |r| r.quality.overall);
        let total_cost = run.task.accumulated_cost;
        let task_id = run.task.id.clone();

        self.progress.notify(match status {
            TaskStatus::Completed => {
                ProgressEvent::Completed { task_id: task_id.clone(), reason, final_quality, total_cost }
            }
            TaskStatus::Cancelled => ProgressEvent::Cancelled { task_id: task_id.clone(), total_cost },
            _ => ProgressEvent::Failed { task_id: task_id.clone(), reason, final_quality, total_cost },
        });
        info!(
            task_id = %task_id,
            status = %run.task.status,
            reason = %reason,
            final_quality,
            total_cost,
            iterations = run.iterations.len(),
            switches = run.switch_events.len(),
            "Task finished"
        );

        TaskOutcome {
            task: run.task,
            reason,
            final_quality,
            total_cost,
            iterations: run.iterations,
            switch_events: run.switch_events,
            recommendations: run.recommendations,
        }
    }
}

async fn call_with_timeout(
    agent: &dyn ExecutionAgent,
    context: &TaskContext,
    limit: Duration,
) -> std::result::Result<AgentOutput, AgentError> {
    match tokio::time::timeout(limit, agent.invoke(context)).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout { agent_id: agent.id().to_string(), after: limit }),
    }
}
