//! Command implementations for the baton CLI.

pub mod checkpoints;
pub mod classify;
pub mod policy;
pub mod run;

use anyhow::{Context, Result};
use baton_orchestrator::HrmPolicy;
use std::path::Path;

/// Loads the policy at `path`, or the built-in defaults.
pub fn load_policy(path: Option<&Path>) -> Result<HrmPolicy> {
    match path {
        Some(path) => HrmPolicy::load(path)
            .with_context(|| format!("Failed to load policy from {}", path.display())),
        None => Ok(HrmPolicy::default()),
    }
}
