//! Persistence sinks and the retrying write helper.
//!
//! Records are append-only. [`MemoryStore`] keeps them in process (tests,
//! dry runs); [`JsonlSink`] appends one JSON object per line to a file.

use crate::retry::RetryPolicy;
use async_trait::async_trait;
use baton_abstraction::{CostEntry, IterationRecord, PersistenceError, PersistenceSink, SwitchEvent};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Runs a persistence write up to `attempts` times with backoff. Each
/// attempt is cut off after `timeout` and counts as
/// [`PersistenceError::Unavailable`].
///
/// # Errors
/// Returns the last error once every attempt failed.
pub async fn persist_with_retry<F, Fut>(
    what: &str,
    attempts: u32,
    timeout: Duration,
    backoff: &RetryPolicy,
    mut write: F,
) -> Result<(), PersistenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), PersistenceError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(timeout, write()).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Unavailable(format!(
                "{} write timed out after {:?}",
                what, timeout
            ))),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                let delay = backoff.calculate_delay(attempt - 1);
                warn!(what, attempt, attempts, error = %e, ?delay, "Persistence write failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(what, attempts, error = %e, "Persistence write failed, giving up");
                return Err(e);
            }
        }
    }
}

/// In-process append-only store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    iterations: Mutex<Vec<IterationRecord>>,
    switches: Mutex<Vec<SwitchEvent>>,
    costs: Mutex<Vec<CostEntry>>,
    /// Remaining writes to reject, for exercising failure paths.
    failures: AtomicU32,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `count` writes with [`PersistenceError::Unavailable`].
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Iteration records, in append order.
    #[must_use]
    pub fn iterations(&self) -> Vec<IterationRecord> {
        self.iterations.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Iteration records of one task, in append order.
    #[must_use]
    pub fn iterations_for(&self, task_id: &str) -> Vec<IterationRecord> {
        self.iterations().into_iter().filter(|r| r.task_id == task_id).collect()
    }

    /// Switch events, in append order.
    #[must_use]
    pub fn switches(&self) -> Vec<SwitchEvent> {
        self.switches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Cost entries, in append order.
    #[must_use]
    pub fn costs(&self) -> Vec<CostEntry> {
        self.costs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn check_failure(&self) -> Result<(), PersistenceError> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PersistenceError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for MemoryStore {
    async fn append_iteration(&self, record: &IterationRecord) -> Result<(), PersistenceError> {
        self.check_failure()?;
        self.iterations.lock().unwrap_or_else(PoisonError::into_inner).push(record.clone());
        Ok(())
    }

    async fn append_switch(&self, event: &SwitchEvent) -> Result<(), PersistenceError> {
        self.check_failure()?;
        self.switches.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
        Ok(())
    }

    async fn append_cost(&self, entry: &CostEntry) -> Result<(), PersistenceError> {
        self.check_failure()?;
        self.costs.lock().unwrap_or_else(PoisonError::into_inner).push(entry.clone());
        Ok(())
    }
}

/// One line of a JSONL journal.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalLine<'a> {
    Iteration(&'a IterationRecord),
    Switch(&'a SwitchEvent),
    Cost(&'a CostEntry),
}

/// Appends records as JSON lines to a file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    /// Serializes appends so lines never interleave.
    lock: tokio::sync::Mutex<()>,
}

impl JsonlSink {
    /// Creates a sink appending to `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: tokio::sync::Mutex::new(()) }
    }

    /// Journal path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: JournalLine<'_>) -> Result<(), PersistenceError> {
        let mut bytes =
            serde_json::to_vec(&line).map_err(|e| PersistenceError::Rejected(e.to_string()))?;
        bytes.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PersistenceError::Unavailable(format!("{}: {e}", self.path.display())))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        file.flush().await.map_err(|e| PersistenceError::Unavailable(e.to_string()))?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Appended journal line");
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for JsonlSink {
    async fn append_iteration(&self, record: &IterationRecord) -> Result<(), PersistenceError> {
        self.append(JournalLine::Iteration(record)).await
    }

    async fn append_switch(&self, event: &SwitchEvent) -> Result<(), PersistenceError> {
        self.append(JournalLine::Switch(event)).await
    }

    async fn append_cost(&self, entry: &CostEntry) -> Result<(), PersistenceError> {
        self.append(JournalLine::Cost(entry)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_abstraction::QualityScore;
    use chrono::Utc;

    const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

    fn cost(sequence: u32, amount: f64, cumulative: f64) -> CostEntry {
        CostEntry {
            task_id: "t1".to_string(),
            sequence,
            agent_id: "haiku".to_string(),
            tokens_used: 100,
            cost: amount,
            cumulative_cost: cumulative,
            recorded_at: Utc::now(),
        }
    }

    fn record(sequence: u32) -> IterationRecord {
        IterationRecord {
            task_id: "t1".to_string(),
            sequence,
            agent_id: "haiku".to_string(),
            quality: QualityScore::zero(),
            tokens_used: 100,
            cost: 0.1,
            duration_ms: 5,
            attempts: 1,
            agent_failed: false,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_appends_in_order() {
        let store = MemoryStore::new();
        store.append_cost(&cost(1, 0.1, 0.1)).await.unwrap();
        store.append_cost(&cost(2, 0.2, 0.3)).await.unwrap();
        store.append_iteration(&record(1)).await.unwrap();

        let costs = store.costs();
        assert_eq!(costs.len(), 2);
        assert_eq!(costs[1].sequence, 2);
        assert_eq!(store.iterations_for("t1").len(), 1);
        assert!(store.iterations_for("other").is_empty());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let store = MemoryStore::new();
        store.fail_next(2);
        let entry = cost(1, 0.1, 0.1);

        persist_with_retry("cost", 3, WRITE_TIMEOUT, &RetryPolicy::immediate(), || {
            store.append_cost(&entry)
        })
        .await
        .unwrap();
        assert_eq!(store.costs().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let store = MemoryStore::new();
        store.fail_next(5);
        let entry = cost(1, 0.1, 0.1);

        let err = persist_with_retry("cost", 3, WRITE_TIMEOUT, &RetryPolicy::immediate(), || {
            store.append_cost(&entry)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
        assert!(store.costs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_write_times_out_as_unavailable() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let err = persist_with_retry("iteration", 3, WRITE_TIMEOUT, &RetryPolicy::immediate(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<(), PersistenceError>>()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PersistenceError::Unavailable(ref m) if m.contains("timed out")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= WRITE_TIMEOUT * 3 && elapsed < WRITE_TIMEOUT * 4, "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_jsonl_sink_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("journal.jsonl"));

        sink.append_iteration(&record(1)).await.unwrap();
        sink.append_cost(&cost(1, 0.1, 0.1)).await.unwrap();

        let content = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let lines: Vec<serde_json::Value> =
            content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "iteration");
        assert_eq!(lines[1]["kind"], "cost");
        assert_eq!(lines[1]["cumulative_cost"], 0.1);
    }

    #[tokio::test]
    async fn test_jsonl_sink_reports_unwritable_path() {
        let sink = JsonlSink::new("/definitely/not/here/journal.jsonl");
        let err = sink.append_cost(&cost(1, 0.1, 0.1)).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Unavailable(_)));
    }
}
