//! Per-agent cost and quality expectations, learned from history.
//!
//! Each agent carries an exponentially weighted moving average of its per-call
//! cost, achieved quality and latency. Unseen agents report a configured prior
//! instead of zero so an untested agent never looks free.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Expected behaviour of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Expected cost per call in USD.
    pub cost: f64,
    /// Expected quality score per call, in [0, 1].
    pub quality: f64,
    /// Expected call latency in milliseconds.
    pub latency_ms: f64,
    /// Number of observations folded into this estimate.
    #[serde(default)]
    pub samples: u64,
}

impl Estimate {
    /// Creates a prior estimate with no observations.
    #[must_use]
    pub fn prior(cost: f64, quality: f64, latency_ms: f64) -> Self {
        Self { cost, quality, latency_ms, samples: 0 }
    }
}

impl Default for Estimate {
    fn default() -> Self {
        Self::prior(1.0, 0.5, 60_000.0)
    }
}

/// One completed call, as seen by the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Billed cost.
    pub cost: f64,
    /// Measured quality.
    pub quality: f64,
    /// Measured latency in milliseconds.
    pub latency_ms: f64,
}

/// Shared cost/quality model.
///
/// Updates for one agent are serialized under the write lock, so a reader
/// always sees either the previous or the new estimate, never a mix.
pub struct CostQualityModel {
    /// Prior for agents without a seeded prior.
    default_prior: Estimate,
    /// Current estimates, seeded priors included.
    estimates: RwLock<HashMap<String, Estimate>>,
}

impl fmt::Debug for CostQualityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostQualityModel")
            .field("default_prior", &self.default_prior)
            .field("agents", &self.estimates.try_read().map(|e| e.len()).unwrap_or(0))
            .finish()
    }
}

impl CostQualityModel {
    /// Creates a model whose unseen agents start at `default_prior`.
    #[must_use]
    pub fn new(default_prior: Estimate) -> Self {
        Self {
            default_prior,
            estimates: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds an agent-specific prior. Ignored once the agent has observations.
    pub fn seed(&self, agent_id: &str, prior: Estimate) {
        let mut estimates = self.estimates.write().unwrap_or_else(PoisonError::into_inner);
        let entry = estimates.entry(agent_id.to_string()).or_insert(prior);
        if entry.samples == 0 {
            *entry = Estimate { samples: 0, ..prior };
        }
    }

    /// Returns the current `(cost, quality)` expectation for an agent.
    #[must_use]
    pub fn estimate(&self, agent_id: &str) -> Estimate {
        self.estimates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .copied()
            .unwrap_or(self.default_prior)
    }

    /// Folds a completed call into the agent's estimate.
    ///
    /// `alpha` is the weight of the new observation, in (0, 1].
    pub fn observe(&self, agent_id: &str, observation: Observation, alpha: f64) -> Estimate {
        let alpha = alpha.clamp(f64::EPSILON, 1.0);
        let mut estimates = self.estimates.write().unwrap_or_else(PoisonError::into_inner);
        let current = estimates.get(agent_id).copied().unwrap_or(self.default_prior);

        let updated = Estimate {
            cost: ewma(current.cost, observation.cost, alpha),
            quality: ewma(current.quality, observation.quality, alpha).clamp(0.0, 1.0),
            latency_ms: ewma(current.latency_ms, observation.latency_ms, alpha),
            samples: current.samples + 1,
        };
        estimates.insert(agent_id.to_string(), updated);

        debug!(
            agent_id = agent_id,
            cost = updated.cost,
            quality = updated.quality,
            latency_ms = updated.latency_ms,
            samples = updated.samples,
            "Updated agent estimate"
        );

        updated
    }

    /// Records a call that produced nothing: quality moves toward 0 while the
    /// cost and latency expectations are left alone.
    pub fn observe_failure(&self, agent_id: &str, alpha: f64) -> Estimate {
        let alpha = alpha.clamp(f64::EPSILON, 1.0);
        let mut estimates = self.estimates.write().unwrap_or_else(PoisonError::into_inner);
        let current = estimates.get(agent_id).copied().unwrap_or(self.default_prior);

        let updated = Estimate {
            quality: ewma(current.quality, 0.0, alpha),
            samples: current.samples + 1,
            ..current
        };
        estimates.insert(agent_id.to_string(), updated);

        debug!(agent_id = agent_id, quality = updated.quality, "Penalized exhausted agent");
        updated
    }
}

impl Default for CostQualityModel {
    fn default() -> Self {
        Self::new(Estimate::default())
    }
}

fn ewma(previous: f64, sample: f64, alpha: f64) -> f64 {
    alpha.mul_add(sample, (1.0 - alpha) * previous)
}
