//! HRM policy: every tunable parameter of the orchestration loop.
//!
//! A policy is loaded from TOML, validated, and handed to each task as an
//! immutable snapshot at admission. See [`store`] for live updates.

pub mod store;

pub use store::{PolicySnapshot, PolicySource, PolicyStore};

use crate::quality::QualityWeights;
use crate::retry::RetryPolicy;
use crate::routing::ClassifierConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading, validating or fetching a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// I/O error reading the file.
    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("Failed to parse policy TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Policy validation error.
    #[error("Invalid policy: {0}")]
    Validation(String),

    /// The policy source has nothing for the requested scope.
    #[error("No policy available for scope '{0}'")]
    UnknownScope(String),
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

/// How aggressively the switch decision engine trades cost for quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchingStrategy {
    /// Raise the bar a candidate's quality gain must clear relative to its cost.
    CostOptimized,
    /// Switch on almost any positive quality improvement.
    QualityFirst,
    /// Among viable candidates, prefer the fastest.
    SpeedOptimized,
    /// Apply the cost-benefit ratio test as configured.
    Adaptive,
    /// Ignore the formula and rotate agents in registration order.
    RoundRobin,
    /// Never switch automatically; only log recommendations.
    Manual,
}

impl SwitchingStrategy {
    /// Multiplier applied to the configured sensitivity.
    #[must_use]
    pub fn sensitivity_factor(&self) -> f64 {
        match self {
            Self::CostOptimized => 2.0,
            Self::QualityFirst => 0.1,
            Self::SpeedOptimized | Self::Adaptive | Self::RoundRobin | Self::Manual => 1.0,
        }
    }
}

impl fmt::Display for SwitchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CostOptimized => "cost_optimized",
            Self::QualityFirst => "quality_first",
            Self::SpeedOptimized => "speed_optimized",
            Self::Adaptive => "adaptive",
            Self::RoundRobin => "round_robin",
            Self::Manual => "manual",
        };
        write!(f, "{name}")
    }
}

impl FromStr for SwitchingStrategy {
    type Err = PolicyError;

    /// Accepts snake_case or kebab-case names, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cost_optimized" => Ok(Self::CostOptimized),
            "quality_first" => Ok(Self::QualityFirst),
            "speed_optimized" => Ok(Self::SpeedOptimized),
            "adaptive" => Ok(Self::Adaptive),
            "round_robin" => Ok(Self::RoundRobin),
            "manual" => Ok(Self::Manual),
            _ => Err(PolicyError::Validation(format!("Unknown switching strategy: {}", s))),
        }
    }
}

/// Full set of orchestration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HrmPolicy {
    /// Fractions of `max_iterations` at which a switch decision is mandatory.
    pub checkpoints: Vec<f64>,
    /// Minimum quality for a task to be considered successful.
    pub quality_gate_threshold: f64,
    /// Switching strategy.
    pub strategy: SwitchingStrategy,
    /// Iteration-over-iteration quality drop that forces an off-schedule decision.
    pub quality_drop_threshold: f64,
    /// Maximum agent switches per task.
    pub max_switches_per_task: u32,
    /// Cost-benefit sensitivity of the switch ratio test.
    pub sensitivity: f64,
    /// Smoothing factor of the per-agent moving averages.
    pub ewma_alpha: f64,
    /// Quality an agent must be expected to reach to be routed a simple task.
    pub min_quality_floor: f64,
    /// Iteration cap per task.
    pub max_iterations: u32,
    /// Cost ceiling per task, in USD.
    pub max_cost: f64,
    /// Duration ceiling per task, in seconds.
    pub max_duration_secs: u64,
    /// Per-call agent timeout, in seconds.
    pub agent_timeout_secs: u64,
    /// Invocation attempts per iteration before the agent counts as exhausted.
    pub max_agent_attempts: u32,
    /// Attempts per quality signal (1 = no retry).
    pub signal_attempts: u32,
    /// Per-attempt quality signal timeout, in seconds.
    pub signal_timeout_secs: u64,
    /// Attempts per persistence write.
    pub persistence_attempts: u32,
    /// Per-attempt persistence write timeout, in seconds.
    pub persistence_timeout_secs: u64,
    /// Complete as soon as the gate is met at any checkpoint.
    pub stop_on_quality_gate: bool,
    /// Starting agent under the `manual` strategy.
    pub default_agent: Option<String>,
    /// Backoff between retries.
    pub retry: RetryPolicy,
    /// Quality dimension weights.
    pub weights: QualityWeights,
    /// Complexity classifier thresholds.
    pub classifier: ClassifierConfig,
}

impl Default for HrmPolicy {
    fn default() -> Self {
        Self {
            checkpoints: vec![0.33, 0.66, 1.0],
            quality_gate_threshold: 0.85,
            strategy: SwitchingStrategy::Adaptive,
            quality_drop_threshold: 0.15,
            max_switches_per_task: 2,
            sensitivity: 0.8,
            ewma_alpha: 0.3,
            min_quality_floor: 0.5,
            max_iterations: 9,
            max_cost: 10.0,
            max_duration_secs: 1_800,
            agent_timeout_secs: 300,
            max_agent_attempts: 3,
            signal_attempts: 2,
            signal_timeout_secs: 120,
            persistence_attempts: 3,
            persistence_timeout_secs: 30,
            stop_on_quality_gate: true,
            default_agent: None,
            retry: RetryPolicy::default(),
            weights: QualityWeights::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl HrmPolicy {
    /// Parses and validates a policy from TOML.
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or the policy is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let policy: Self = toml::from_str(content)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Loads and validates a policy from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serializes the policy to TOML.
    ///
    /// # Errors
    /// Returns a validation error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PolicyError::Validation(format!("Cannot serialize policy: {}", e)))
    }

    /// Per-call agent timeout.
    #[must_use]
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// Per-attempt quality signal timeout.
    #[must_use]
    pub fn signal_timeout(&self) -> Duration {
        Duration::from_secs(self.signal_timeout_secs)
    }

    /// Per-attempt persistence write timeout.
    #[must_use]
    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_secs(self.persistence_timeout_secs)
    }

    /// Duration ceiling per task.
    #[must_use]
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    /// Sensitivity after the strategy bias is applied.
    #[must_use]
    pub fn effective_sensitivity(&self) -> f64 {
        self.sensitivity * self.strategy.sensitivity_factor()
    }

    /// Validates the policy.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoints.is_empty() {
            return Err(PolicyError::Validation(
                "At least one checkpoint fraction is required".to_string(),
            ));
        }
        for fraction in &self.checkpoints {
            if !fraction.is_finite() || *fraction <= 0.0 || *fraction > 1.0 {
                return Err(PolicyError::Validation(format!(
                    "Invalid checkpoint fraction: {}. Must be in (0.0, 1.0]",
                    fraction
                )));
            }
        }

        check_unit("quality_gate_threshold", self.quality_gate_threshold)?;
        check_unit("quality_drop_threshold", self.quality_drop_threshold)?;
        check_unit("min_quality_floor", self.min_quality_floor)?;

        if !self.sensitivity.is_finite() || self.sensitivity < 0.0 {
            return Err(PolicyError::Validation(format!(
                "Invalid sensitivity: {}. Must be a non-negative number",
                self.sensitivity
            )));
        }
        if !self.ewma_alpha.is_finite() || self.ewma_alpha <= 0.0 || self.ewma_alpha > 1.0 {
            return Err(PolicyError::Validation(format!(
                "Invalid ewma_alpha: {}. Must be in (0.0, 1.0]",
                self.ewma_alpha
            )));
        }
        if self.max_iterations == 0 {
            return Err(PolicyError::Validation(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.max_cost.is_finite() || self.max_cost <= 0.0 {
            return Err(PolicyError::Validation(format!(
                "Invalid max_cost: {}. Must be positive",
                self.max_cost
            )));
        }
        if self.max_duration_secs == 0 {
            return Err(PolicyError::Validation(
                "max_duration_secs must be positive".to_string(),
            ));
        }
        for (name, secs) in [
            ("agent_timeout_secs", self.agent_timeout_secs),
            ("signal_timeout_secs", self.signal_timeout_secs),
            ("persistence_timeout_secs", self.persistence_timeout_secs),
        ] {
            if secs == 0 {
                return Err(PolicyError::Validation(format!("{} must be positive", name)));
            }
        }
        for (name, attempts) in [
            ("max_agent_attempts", self.max_agent_attempts),
            ("signal_attempts", self.signal_attempts),
            ("persistence_attempts", self.persistence_attempts),
        ] {
            if attempts == 0 {
                return Err(PolicyError::Validation(format!("{} must be at least 1", name)));
            }
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(PolicyError::Validation(format!(
                "Invalid retry multiplier: {}. Must be at least 1.0",
                self.retry.multiplier
            )));
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(PolicyError::Validation(
                "retry.max_delay_ms must not be below retry.initial_delay_ms".to_string(),
            ));
        }

        self.weights.validate()?;
        self.classifier.validate()?;

        if self.strategy == SwitchingStrategy::Manual && self.default_agent.as_deref() == Some("") {
            return Err(PolicyError::Validation("default_agent must not be empty".to_string()));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(PolicyError::Validation(format!(
            "Invalid {}: {}. Must be between 0.0 and 1.0",
            name, value
        )));
    }
    Ok(())
}
