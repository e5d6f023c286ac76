//! Policy snapshots and live updates.

use super::{HrmPolicy, PolicyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// An immutable policy as seen by one task.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    /// The policy itself.
    pub policy: Arc<HrmPolicy>,
    /// Monotonic revision; higher is newer.
    pub revision: u64,
    /// Whether already-running tasks should adopt this revision.
    pub apply_to_active: bool,
}

/// Where the executor obtains policy snapshots.
///
/// Consulted once at admission, and at every checkpoint of a running task so
/// that updates marked `apply_to_active` can be adopted.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Returns the current snapshot for a task or project scope.
    ///
    /// # Errors
    /// Returns an error if no policy is available for the scope.
    async fn get_policy(&self, scope: &str) -> Result<PolicySnapshot>;
}

/// In-process policy source with per-scope overrides.
pub struct PolicyStore {
    /// Snapshot used for scopes without an override.
    default: RwLock<PolicySnapshot>,
    /// Per-scope overrides.
    scoped: RwLock<HashMap<String, PolicySnapshot>>,
    /// Revision counter shared by every scope.
    revision: AtomicU64,
}

impl fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyStore")
            .field("revision", &self.revision.load(Ordering::Relaxed))
            .field("scopes", &self.scoped.try_read().map(|s| s.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl PolicyStore {
    /// Creates a store serving `policy` to every scope.
    ///
    /// # Errors
    /// Returns an error if the policy is invalid.
    pub fn new(policy: HrmPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            default: RwLock::new(PolicySnapshot {
                policy: Arc::new(policy),
                revision: 1,
                apply_to_active: false,
            }),
            scoped: RwLock::new(HashMap::new()),
            revision: AtomicU64::new(1),
        })
    }

    /// Publishes a new policy.
    ///
    /// With `scope = None` the default is replaced; otherwise only that scope
    /// is overridden. An invalid policy is rejected and the previous snapshot
    /// stays live.
    ///
    /// # Errors
    /// Returns a validation error if the policy is invalid.
    pub async fn publish(
        &self,
        scope: Option<&str>,
        policy: HrmPolicy,
        apply_to_active: bool,
    ) -> Result<u64> {
        if let Err(e) = policy.validate() {
            warn!(scope = ?scope, error = %e, "Rejected policy update");
            return Err(e);
        }

        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = PolicySnapshot {
            policy: Arc::new(policy),
            revision,
            apply_to_active,
        };

        match scope {
            Some(scope) => {
                self.scoped.write().await.insert(scope.to_string(), snapshot);
            }
            None => {
                *self.default.write().await = snapshot;
            }
        }

        info!(scope = ?scope, revision, apply_to_active, "Published policy");
        Ok(revision)
    }

    /// Drops a scope override so the scope falls back to the default.
    pub async fn clear_scope(&self, scope: &str) -> bool {
        self.scoped.write().await.remove(scope).is_some()
    }
}

#[async_trait]
impl PolicySource for PolicyStore {
    async fn get_policy(&self, scope: &str) -> Result<PolicySnapshot> {
        if let Some(snapshot) = self.scoped.read().await.get(scope) {
            return Ok(snapshot.clone());
        }
        Ok(self.default.read().await.clone())
    }
}

/// A policy source that only knows explicitly registered scopes.
///
/// Useful where a missing scope must be treated as a configuration error.
pub struct StrictPolicySource {
    /// Snapshots by scope.
    scopes: HashMap<String, PolicySnapshot>,
}

impl StrictPolicySource {
    /// Creates a source from validated `(scope, policy)` pairs.
    ///
    /// # Errors
    /// Returns an error if any policy is invalid.
    pub fn new(entries: impl IntoIterator<Item = (String, HrmPolicy)>) -> Result<Self> {
        let mut scopes = HashMap::new();
        for (scope, policy) in entries {
            policy.validate()?;
            scopes.insert(
                scope,
                PolicySnapshot {
                    policy: Arc::new(policy),
                    revision: 1,
                    apply_to_active: false,
                },
            );
        }
        Ok(Self { scopes })
    }
}

#[async_trait]
impl PolicySource for StrictPolicySource {
    async fn get_policy(&self, scope: &str) -> Result<PolicySnapshot> {
        self.scopes
            .get(scope)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownScope(scope.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SwitchingStrategy;

    #[tokio::test]
    async fn test_publish_bumps_revision() {
        let store = PolicyStore::new(HrmPolicy::default()).unwrap();
        let first = store.get_policy("proj").await.unwrap();
        assert_eq!(first.revision, 1);

        let manual = HrmPolicy { strategy: SwitchingStrategy::Manual, ..HrmPolicy::default() };
        let revision = store.publish(None, manual, true).await.unwrap();
        assert_eq!(revision, 2);

        let second = store.get_policy("proj").await.unwrap();
        assert_eq!(second.revision, 2);
        assert!(second.apply_to_active);
        assert_eq!(second.policy.strategy, SwitchingStrategy::Manual);
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_previous_snapshot() {
        let store = PolicyStore::new(HrmPolicy::default()).unwrap();
        let bad = HrmPolicy { max_iterations: 0, ..HrmPolicy::default() };
        assert!(store.publish(None, bad, true).await.is_err());

        let snapshot = store.get_policy("any").await.unwrap();
        assert_eq!(snapshot.revision, 1);
        assert_eq!(snapshot.policy.max_iterations, 9);
    }

    #[tokio::test]
    async fn test_scope_override_and_fallback() {
        let store = PolicyStore::new(HrmPolicy::default()).unwrap();
        let scoped = HrmPolicy { max_iterations: 3, ..HrmPolicy::default() };
        store.publish(Some("alpha"), scoped, false).await.unwrap();

        assert_eq!(store.get_policy("alpha").await.unwrap().policy.max_iterations, 3);
        assert_eq!(store.get_policy("beta").await.unwrap().policy.max_iterations, 9);

        assert!(store.clear_scope("alpha").await);
        assert_eq!(store.get_policy("alpha").await.unwrap().policy.max_iterations, 9);
    }

    #[tokio::test]
    async fn test_strict_source_rejects_unknown_scope() {
        let source =
            StrictPolicySource::new([("alpha".to_string(), HrmPolicy::default())]).unwrap();
        assert!(source.get_policy("alpha").await.is_ok());
        assert!(matches!(
            source.get_policy("beta").await,
            Err(PolicyError::UnknownScope(_))
        ));
    }
}
