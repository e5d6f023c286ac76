//! Classify a change request without running it.

use super::load_policy;
use anyhow::Result;
use baton_orchestrator::{ComplexityClassifier, TaskSignals};
use colored::Colorize;
use std::path::PathBuf;

/// Execute classify command.
pub fn execute(
    loc: u32,
    labels: Vec<String>,
    description: Option<String>,
    policy: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let policy = load_policy(policy.as_deref())?;
    let classifier = ComplexityClassifier::new(policy.classifier);
    let signals = TaskSignals {
        estimated_loc: loc,
        labels,
        description: description.unwrap_or_default(),
    };

    let bucket = classifier.classify(&signals);
    let high_risk = classifier.is_high_risk(&signals);

    if json {
        let report = serde_json::json!({
            "complexity": bucket,
            "high_risk": high_risk,
            "signals": signals,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Complexity: {}", bucket.to_string().bold());
        if high_risk {
            println!("High risk:  {}", "yes".yellow());
        } else {
            println!("High risk:  no");
        }
    }
    Ok(())
}
