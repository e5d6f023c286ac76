//! Boundary contracts for Baton.
//!
//! This crate defines the traits and data types the orchestration core consumes
//! and exposes: execution agents, quality signal providers, the persistence
//! sink, and the progress sink. Implementations live outside the core.

pub mod agent;
pub mod records;
pub mod signals;
pub mod sinks;

pub use agent::{AgentError, AgentOutput, Capability, CapabilitySet, ExecutionAgent, TaskContext};
pub use records::{
    CostEntry, Dimension, IterationRecord, QualityScore, SwitchEvent, SwitchReason,
    TerminalReason,
};
pub use signals::{DocReport, SecurityReport, SignalError, SignalProvider, TestReport, TypeReport};
pub use sinks::{PersistenceError, PersistenceSink, ProgressEvent, ProgressSink};
