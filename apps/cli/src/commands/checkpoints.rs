//! Show the checkpoint schedule a policy produces.

use super::load_policy;
use anyhow::{Result, bail};
use baton_orchestrator::CheckpointSchedule;
use std::path::PathBuf;

/// Execute checkpoints command.
pub fn execute(
    max_iterations: Option<u32>,
    fractions: Vec<f64>,
    policy: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let policy = load_policy(policy.as_deref())?;
    let max_iterations = max_iterations.unwrap_or(policy.max_iterations);
    if max_iterations == 0 {
        bail!("max_iterations must be at least 1");
    }
    let fractions = if fractions.is_empty() { policy.checkpoints } else { fractions };
    if let Some(bad) = fractions.iter().find(|f| !(**f > 0.0 && **f <= 1.0)) {
        bail!("Invalid checkpoint fraction: {}. Must be in (0.0, 1.0]", bad);
    }

    let schedule = CheckpointSchedule::compute(max_iterations, &fractions);
    if json {
        let report = serde_json::json!({
            "max_iterations": max_iterations,
            "fractions": fractions,
            "checkpoints": schedule.indices(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let indices: Vec<String> = schedule.indices().iter().map(ToString::to_string).collect();
        println!("Checkpoints for {} iterations: {}", max_iterations, indices.join(", "));
    }
    Ok(())
}
