//! Concurrent task dispatcher.
//!
//! Admits tasks synchronously (so configuration errors reach the caller at
//! submit time), then runs each one on its own tokio task. A semaphore bounds
//! how many tasks iterate at once; the rest wait for a permit.

use crate::error::{OrchestrationError, Result};
use crate::executor::TaskExecutor;
use crate::task::{TaskOutcome, TaskRequest};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Configuration for the task dispatcher.
#[derive(Debug, Clone)]
pub struct TaskDispatcherConfig {
    /// Tasks allowed to iterate at the same time.
    pub max_concurrent_tasks: usize,
}

impl Default for TaskDispatcherConfig {
    fn default() -> Self {
        Self { max_concurrent_tasks: 8 }
    }
}

/// Handle to a submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: String,
    cancel: CancellationToken,
    join: JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    /// ID of the submitted task.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Requests graceful cancellation. The in-flight iteration finishes and
    /// is recorded; no new iteration starts.
    pub fn cancel(&self) {
        info!(task_id = %self.task_id, "Cancelling task");
        self.cancel.cancel();
    }

    /// Waits for the terminal outcome.
    ///
    /// # Errors
    /// Returns [`OrchestrationError::Runner`] if the runner panicked or was
    /// aborted.
    pub async fn outcome(self) -> Result<TaskOutcome> {
        self.join.await.map_err(|e| OrchestrationError::Runner(e.to_string()))
    }
}

/// Runs many tasks concurrently over one executor.
#[derive(Debug)]
pub struct TaskDispatcher {
    executor: Arc<TaskExecutor>,
    permits: Arc<Semaphore>,
    /// Parent of every task's cancellation token.
    shutdown: CancellationToken,
    config: TaskDispatcherConfig,
}

impl TaskDispatcher {
    /// Creates a new task dispatcher.
    #[must_use]
    pub fn new(executor: Arc<TaskExecutor>, config: TaskDispatcherConfig) -> Self {
        Self {
            executor,
            permits: Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1))),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// The dispatcher configuration.
    #[must_use]
    pub fn config(&self) -> &TaskDispatcherConfig {
        &self.config
    }

    /// Admits a task and schedules it.
    ///
    /// # Errors
    /// Returns the admission error if the task is rejected; nothing is
    /// scheduled in that case.
    pub async fn submit(&self, request: TaskRequest) -> Result<TaskHandle> {
        let admitted = self.executor.admit(request).await?;
        let task_id = admitted.task().id.clone();
        let cancel = self.shutdown.child_token();

        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.permits);
        let token = cancel.clone();
        let id = task_id.clone();
        let join = tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await.ok();
            debug!(task_id = %id, "Task acquired a run slot");
            executor.execute(admitted, token).await
        });

        Ok(TaskHandle { task_id, cancel, join })
    }

    /// Submits every request and waits for all outcomes, in submission order.
    ///
    /// Admission failures are reported per request.
    pub async fn run_all(&self, requests: Vec<TaskRequest>) -> Vec<Result<TaskOutcome>> {
        let mut pending = Vec::with_capacity(requests.len());
        for request in requests {
            pending.push(self.submit(request).await);
        }
        futures::future::join_all(pending.into_iter().map(|submitted| async move {
            match submitted {
                Ok(handle) => handle.outcome().await,
                Err(e) => Err(e),
            }
        }))
        .await
    }

    /// Cancels every task submitted through this dispatcher.
    pub fn cancel_all(&self) {
        info!("Cancelling all tasks");
        self.shutdown.cancel();
    }

    /// Run slots currently free.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }
}
