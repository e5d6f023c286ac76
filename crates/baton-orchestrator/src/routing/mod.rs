//! Complexity classification and initial agent routing.
//!
//! The classifier buckets a task from its static signals; the router then
//! picks the starting agent from the compatible set using the bucket, the
//! policy strategy and the cost/quality model.

pub mod complexity;
pub mod router;
pub mod types;

pub use complexity::{ClassifierConfig, ComplexityClassifier};
pub use router::Router;
pub use types::{ComplexityBucket, RouteRationale, RoutingDecision, TaskSignals};
