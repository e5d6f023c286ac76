//! Policy inspection commands.

use anyhow::{Context, Result};
use baton_orchestrator::HrmPolicy;
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Policy command options.
#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Validate a policy TOML file
    Validate {
        /// Path to the policy file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the built-in default policy as TOML
    Defaults,
}

/// Execute policy command.
pub fn execute(cmd: PolicyCommand) -> Result<()> {
    match cmd {
        PolicyCommand::Validate { file, json } => validate(&file, json),
        PolicyCommand::Defaults => {
            let toml = HrmPolicy::default()
                .to_toml_string()
                .context("Failed to render default policy")?;
            print!("{}", toml);
            Ok(())
        }
    }
}

fn validate(file: &Path, json: bool) -> Result<()> {
    match HrmPolicy::load(file) {
        Ok(policy) => {
            if json {
                let report = serde_json::json!({
                    "valid": true,
                    "file": file.display().to_string(),
                    "policy": policy,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{} Policy is valid: {}", "✓".green(), file.display());
                println!("  Strategy:         {}", policy.strategy.to_string().cyan());
                println!("  Quality gate:     {:.2}", policy.quality_gate_threshold);
                println!("  Checkpoints:      {:?}", policy.checkpoints);
                println!("  Max iterations:   {}", policy.max_iterations);
                println!("  Max cost:         ${:.2}", policy.max_cost);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let report = serde_json::json!({
                    "valid": false,
                    "file": file.display().to_string(),
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                eprintln!("{} {}", "✗".red(), e);
            }
            anyhow::bail!("Policy file {} is invalid", file.display())
        }
    }
}
