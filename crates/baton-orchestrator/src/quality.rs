//! Multi-dimensional quality evaluation of a candidate change.
//!
//! The scalar is a fixed linear combination of per-dimension sub-scores.
//! A signal that cannot be obtained scores its dimensions 0: missing
//! evidence is penalized, never ignored. Every signal attempt runs under a
//! timeout, so a hung provider costs at most the evaluation budget.

use crate::policy::PolicyError;
use baton_abstraction::{Dimension, QualityScore, SignalError, SignalProvider};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Tolerance on the weight sum.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weights for quality dimensions. Every dimension must be declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityWeights {
    /// Weight for the test-pass dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<f64>,
    /// Weight for coverage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// Weight for security.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<f64>,
    /// Weight for type safety.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_safety: Option<f64>,
    /// Weight for documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<f64>,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            tests: Some(0.30),
            coverage: Some(0.20),
            security: Some(0.25),
            type_safety: Some(0.15),
            documentation: Some(0.10),
        }
    }
}

impl QualityWeights {
    /// All weight on a single dimension.
    #[must_use]
    pub fn only(dimension: Dimension) -> Self {
        let mut weights = Self {
            tests: Some(0.0),
            coverage: Some(0.0),
            security: Some(0.0),
            type_safety: Some(0.0),
            documentation: Some(0.0),
        };
        *weights.slot_mut(dimension) = Some(1.0);
        weights
    }

    /// Returns the declared weight of a dimension.
    #[must_use]
    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        match dimension {
            Dimension::Tests => self.tests,
            Dimension::Coverage => self.coverage,
            Dimension::Security => self.security,
            Dimension::TypeSafety => self.type_safety,
            Dimension::Documentation => self.documentation,
        }
    }

    fn slot_mut(&mut self, dimension: Dimension) -> &mut Option<f64> {
        match dimension {
            Dimension::Tests => &mut self.tests,
            Dimension::Coverage => &mut self.coverage,
            Dimension::Security => &mut self.security,
            Dimension::TypeSafety => &mut self.type_safety,
            Dimension::Documentation => &mut self.documentation,
        }
    }

    /// Validates that every dimension is declared, in range, and that the
    /// weights sum to 1.
    ///
    /// # Errors
    /// Returns a validation error describing the first problem found.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut sum = 0.0;
        for dimension in Dimension::ALL {
            let Some(weight) = self.get(dimension) else {
                return Err(PolicyError::Validation(format!(
                    "Missing weight for quality dimension '{}'",
                    dimension
                )));
            };
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(PolicyError::Validation(format!(
                    "Invalid weight for '{}': {}. Must be between 0.0 and 1.0",
                    dimension, weight
                )));
            }
            sum += weight;
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PolicyError::Validation(format!(
                "Quality weights must sum to 1.0, got sum {:.6}",
                sum
            )));
        }
        Ok(())
    }

    /// Linear combination of sub-scores, clamped to [0, 1].
    #[must_use]
    pub fn combine(&self, breakdown: &BTreeMap<Dimension, f64>) -> f64 {
        Dimension::ALL
            .iter()
            .map(|d| self.get(*d).unwrap_or(0.0) * breakdown.get(d).copied().unwrap_or(0.0))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

/// Scores candidate changes from signal-provider evidence.
///
/// Evaluation has no side effects; the executor persists the result.
#[derive(Clone)]
pub struct QualityEvaluator {
    /// Evidence source.
    provider: Arc<dyn SignalProvider>,
    /// Dimension weights.
    weights: QualityWeights,
    /// Attempts per signal (1 = no retry).
    attempts: u32,
    /// Timeout of one signal attempt.
    timeout: Duration,
}

impl QualityEvaluator {
    /// Creates an evaluator.
    ///
    /// `weights` are expected to be validated already (policy load does this).
    #[must_use]
    pub fn new(
        provider: Arc<dyn SignalProvider>,
        weights: QualityWeights,
        attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            weights,
            attempts: attempts.max(1),
            timeout,
        }
    }

    /// Scores a patch. All signals are gathered concurrently.
    ///
    /// A signal still pending after `budget` is abandoned; retries of one
    /// signal share the budget, and a signal that runs out of it scores 0
    /// like any other failure.
    pub async fn evaluate(&self, patch: &str, budget: Duration) -> QualityScore {
        let deadline = Instant::now().checked_add(budget);
        let provider = &self.provider;
        let (tests, security, types, docs) = tokio::join!(
            self.with_retry("tests", deadline, || provider.run_tests(patch)),
            self.with_retry("security", deadline, || provider.scan_security(patch)),
            self.with_retry("type_safety", deadline, || provider.check_types(patch)),
            self.with_retry("documentation", deadline, || provider.audit_docs(patch)),
        );

        let mut breakdown = BTreeMap::new();
        let mut missing = Vec::new();

        match tests {
            Some(report) => {
                breakdown.insert(Dimension::Tests, if report.passing { 1.0 } else { 0.0 });
                breakdown.insert(Dimension::Coverage, unit(report.coverage));
            }
            None => {
                missing.extend([Dimension::Tests, Dimension::Coverage]);
            }
        }
        match security {
            Some(report) => {
                breakdown.insert(Dimension::Security, inverse_count(report.vulnerability_count));
            }
            None => missing.push(Dimension::Security),
        }
        match types {
            Some(report) => {
                breakdown.insert(Dimension::TypeSafety, inverse_count(report.error_count));
            }
            None => missing.push(Dimension::TypeSafety),
        }
        match docs {
            Some(report) => {
                breakdown.insert(Dimension::Documentation, unit(report.documented_ratio));
            }
            None => missing.push(Dimension::Documentation),
        }
        for dimension in &missing {
            breakdown.insert(*dimension, 0.0);
        }

        let overall = self.weights.combine(&breakdown);
        debug!(overall, missing = ?missing, "Evaluated candidate quality");

        QualityScore {
            overall,
            breakdown,
            tests_passed: tests.map(|r| r.passing),
            missing,
        }
    }

    /// Runs a signal call up to `attempts` times, each bounded by the
    /// per-attempt timeout and the shared deadline. Returns `None` if no
    /// attempt succeeded.
    async fn with_retry<T, F, Fut>(
        &self,
        signal: &str,
        deadline: Option<Instant>,
        mut call: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SignalError>>,
    {
        let attempts = self.attempts;
        for attempt in 1..=attempts {
            let limit = deadline.map_or(self.timeout, |d| {
                self.timeout.min(d.saturating_duration_since(Instant::now()))
            });
            if limit.is_zero() {
                warn!(signal, attempt, attempts, "Quality signal out of time");
                break;
            }
            match tokio::time::timeout(limit, call()).await {
                Ok(Ok(value)) => return Some(value),
                Ok(Err(e)) => {
                    warn!(signal, attempt, attempts, error = %e, "Quality signal failed");
                }
                Err(_) => {
                    warn!(signal, attempt, attempts, ?limit, "Quality signal timed out");
                }
            }
        }
        None
    }
}

/// Clamps a ratio into [0, 1], mapping NaN to 0.
fn unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// 1 for no findings, halving as findings accumulate: 1 / (1 + n).
fn inverse_count(count: u32) -> f64 {
    1.0 / (1.0 + f64::from(count))
}
