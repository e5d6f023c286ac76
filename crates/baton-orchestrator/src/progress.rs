//! Progress reporting for running tasks.
//!
//! [`ProgressReporter`] is the stock [`ProgressSink`]: it keeps an aggregate
//! metrics snapshot and re-broadcasts every event to any number of
//! subscribers. Slow subscribers lag and drop events; the executor never
//! waits on them.

use baton_abstraction::{ProgressEvent, ProgressSink};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast buffer per subscriber.
const CHANNEL_CAPACITY: usize = 256;

/// Progress metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressMetrics {
    /// Iterations reported across all tasks.
    pub iterations: u64,
    /// Agent switches across all tasks.
    pub switches: u64,
    /// Tasks that completed.
    pub completed_tasks: usize,
    /// Tasks that failed.
    pub failed_tasks: usize,
    /// Tasks that were cancelled.
    pub cancelled_tasks: usize,
    /// Spend of every finished task, in USD.
    pub total_cost: f64,
}

/// Progress reporter backed by a broadcast channel.
pub struct ProgressReporter {
    /// Broadcast sender for progress events.
    broadcast_tx: broadcast::Sender<ProgressEvent>,
    /// Current metrics.
    metrics: Mutex<ProgressMetrics>,
}

impl ProgressReporter {
    /// Creates a new progress reporter.
    #[must_use]
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { broadcast_tx, metrics: Mutex::new(ProgressMetrics::default()) }
    }

    /// Subscribes to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Gets the current progress metrics snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProgressMetrics {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ProgressSink for ProgressReporter {
    fn notify(&self, event: ProgressEvent) {
        {
            let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
            match &event {
                ProgressEvent::Progress { .. } => metrics.iterations += 1,
                ProgressEvent::AgentSwitched { .. } => metrics.switches += 1,
                ProgressEvent::Completed { total_cost, .. } => {
                    metrics.completed_tasks += 1;
                    metrics.total_cost += total_cost;
                }
                ProgressEvent::Failed { total_cost, .. } => {
                    metrics.failed_tasks += 1;
                    metrics.total_cost += total_cost;
                }
                ProgressEvent::Cancelled { total_cost, .. } => {
                    metrics.cancelled_tasks += 1;
                    metrics.total_cost += total_cost;
                }
            }
        }

        debug!(task_id = event.task_id(), "Progress event: {:?}", event);
        // No subscribers is fine.
        let _ = self.broadcast_tx.send(event);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn notify(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_abstraction::{SwitchReason, TerminalReason};

    #[test]
    fn test_progress_reporter_new() {
        let reporter = ProgressReporter::new();
        assert_eq!(reporter.snapshot(), ProgressMetrics::default());
    }

    #[tokio::test]
    async fn test_progress_reporter_events() {
        let reporter = ProgressReporter::new();
        let mut rx = reporter.subscribe();

        reporter.notify(ProgressEvent::Progress {
            task_id: "task-1".to_string(),
            iteration: 1,
            agent_id: "haiku".to_string(),
            quality: 0.4,
            total_cost: 0.1,
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ProgressEvent::Progress { iteration: 1, .. }));

        reporter.notify(ProgressEvent::AgentSwitched {
            task_id: "task-1".to_string(),
            from_agent: "haiku".to_string(),
            to_agent: "opus".to_string(),
            reason: SwitchReason::QualityGap,
        });
        reporter.notify(ProgressEvent::Completed {
            task_id: "task-1".to_string(),
            reason: TerminalReason::QualityGateMet,
            final_quality: 0.9,
            total_cost: 2.5,
        });
        assert!(matches!(rx.recv().await.unwrap(), ProgressEvent::AgentSwitched { .. }));
        assert!(matches!(rx.recv().await.unwrap(), ProgressEvent::Completed { .. }));

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.iterations, 1);
        assert_eq!(snapshot.switches, 1);
        assert_eq!(snapshot.completed_tasks, 1);
        assert!((snapshot.total_cost - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_notify_without_subscribers() {
        let reporter = ProgressReporter::new();
        reporter.notify(ProgressEvent::Cancelled { task_id: "t".to_string(), total_cost: 0.0 });
        reporter.notify(ProgressEvent::Failed {
            task_id: "u".to_string(),
            reason: TerminalReason::AgentsExhausted,
            final_quality: 0.0,
            total_cost: 1.0,
        });

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.cancelled_tasks, 1);
        assert_eq!(snapshot.failed_tasks, 1);
    }
}
