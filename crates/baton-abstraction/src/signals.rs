//! Quality signal providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of running the test suite against a patch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Whether every test passed.
    pub passing: bool,
    /// Line coverage in [0, 1].
    pub coverage: f64,
}

/// Result of a security scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Number of findings.
    pub vulnerability_count: u32,
}

/// Result of a type check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeReport {
    /// Number of type errors.
    pub error_count: u32,
}

/// Result of a documentation audit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocReport {
    /// Share of public items that are documented, in [0, 1].
    pub documented_ratio: f64,
}

/// A signal could not be obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The provider ran but could not produce a result.
    #[error("Signal '{signal}' failed: {message}")]
    Failed {
        /// Signal name (e.g., "tests").
        signal: String,
        /// Provider-supplied detail.
        message: String,
    },

    /// The provider does not support this signal.
    #[error("Signal '{0}' is not supported by this provider")]
    Unsupported(String),
}

/// Produces the raw evidence the quality evaluator scores.
///
/// All calls are I/O-bound and may be slow; the evaluator runs them
/// concurrently and never lets a failure block the loop.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Runs the test suite against a patch.
    async fn run_tests(&self, patch: &str) -> Result<TestReport, SignalError>;

    /// Scans a patch for security issues.
    async fn scan_security(&self, patch: &str) -> Result<SecurityReport, SignalError>;

    /// Type-checks a patch.
    async fn check_types(&self, patch: &str) -> Result<TypeReport, SignalError>;

    /// Audits documentation coverage of a patch.
    async fn audit_docs(&self, patch: &str) -> Result<DocReport, SignalError>;
}
