//! Complexity classification from static task signals.

use super::types::{ComplexityBucket, TaskSignals};
use crate::policy::PolicyError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Thresholds for the complexity classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Changes below this many lines may be simple.
    pub simple_max_loc: u32,
    /// Changes above this many lines are complex.
    pub complex_min_loc: u32,
    /// Descriptions longer than this (in characters) are never simple.
    pub long_description_chars: usize,
    /// Labels that make a task complex regardless of size.
    pub high_risk_labels: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            simple_max_loc: 50,
            complex_min_loc: 400,
            long_description_chars: 2_000,
            high_risk_labels: vec!["security".to_string(), "architecture".to_string()],
        }
    }
}

impl ClassifierConfig {
    /// Validates threshold ordering.
    ///
    /// # Errors
    /// Returns a validation error if the simple bound exceeds the complex bound.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.simple_max_loc > self.complex_min_loc {
            return Err(PolicyError::Validation(format!(
                "classifier.simple_max_loc ({}) must not exceed classifier.complex_min_loc ({})",
                self.simple_max_loc, self.complex_min_loc
            )));
        }
        Ok(())
    }
}

/// Assigns the initial complexity bucket. Deterministic: identical signals
/// always yield the same bucket.
///
/// The bucket is advisory. It seeds the router but never pins the agent.
#[derive(Debug, Clone, Default)]
pub struct ComplexityClassifier {
    config: ClassifierConfig,
}

impl ComplexityClassifier {
    /// Creates a classifier with the given thresholds.
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Returns `true` if any label is configured as high risk.
    #[must_use]
    pub fn is_high_risk(&self, signals: &TaskSignals) -> bool {
        self.config.high_risk_labels.iter().any(|label| signals.has_label(label))
    }

    /// Classifies a task.
    #[must_use]
    pub fn classify(&self, signals: &TaskSignals) -> ComplexityBucket {
        let high_risk = self.is_high_risk(signals);
        let description_chars = signals.description.chars().count();

        let bucket = if high_risk || signals.estimated_loc > self.config.complex_min_loc {
            ComplexityBucket::Complex
        } else if signals.estimated_loc < self.config.simple_max_loc
            && description_chars <= self.config.long_description_chars
        {
            ComplexityBucket::Simple
        } else {
            ComplexityBucket::Medium
        };

        debug!(
            estimated_loc = signals.estimated_loc,
            high_risk,
            description_chars,
            bucket = %bucket,
            "Classified task complexity"
        );

        bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(loc: u32, labels: &[&str], description: &str) -> TaskSignals {
        TaskSignals {
            estimated_loc: loc,
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_small_unlabeled_change_is_simple() {
        let classifier = ComplexityClassifier::default();
        assert_eq!(classifier.classify(&signals(10, &[], "fix typo")), ComplexityBucket::Simple);
    }

    #[test]
    fn test_large_change_is_complex() {
        let classifier = ComplexityClassifier::default();
        assert_eq!(classifier.classify(&signals(900, &[], "")), ComplexityBucket::Complex);
    }

    #[test]
    fn test_high_risk_label_forces_complex() {
        let classifier = ComplexityClassifier::default();
        assert_eq!(
            classifier.classify(&signals(3, &["Security"], "rotate key")),
            ComplexityBucket::Complex
        );
        assert_eq!(
            classifier.classify(&signals(3, &[" architecture "], "")),
            ComplexityBucket::Complex
        );
    }

    #[test]
    fn test_between_bounds_is_medium() {
        let classifier = ComplexityClassifier::default();
        assert_eq!(classifier.classify(&signals(50, &[], "")), ComplexityBucket::Medium);
        assert_eq!(classifier.classify(&signals(400, &["docs"], "")), ComplexityBucket::Medium);
    }

    #[test]
    fn test_long_description_is_never_simple() {
        let classifier = ComplexityClassifier::default();
        let long = "x".repeat(2_001);
        assert_eq!(classifier.classify(&signals(5, &[], &long)), ComplexityBucket::Medium);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = ComplexityClassifier::default();
        let input = signals(120, &["refactor"], "split the parser module");
        assert_eq!(classifier.classify(&input), classifier.classify(&input));
    }

    #[test]
    fn test_inverted_bounds_are_invalid() {
        let config = ClassifierConfig { simple_max_loc: 500, complex_min_loc: 100, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
