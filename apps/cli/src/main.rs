//! Baton CLI - Command-line interface for the adaptive orchestration loop
//!
//! Provides a `baton` command that runs scenario files of scripted agents
//! through the orchestrator and inspects policies, classification and
//! checkpoint schedules.

mod commands;
mod scenario;

use clap::{CommandFactory, Parser, Subcommand};
use commands::policy::PolicyCommand;
use baton_orchestrator::SwitchingStrategy;
use commands::run::RunOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Baton CLI - Adaptive multi-agent task orchestration
///
/// Drives change requests through bounded refine/evaluate iterations,
/// switching between execution agents at checkpoints when the expected
/// quality gain justifies the extra cost.
#[derive(Parser, Debug)]
#[command(
    name = "baton",
    author,
    version,
    about = "Baton - Adaptive multi-agent task orchestration"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the tasks of a scenario file
    ///
    /// Registers the scenario's scripted agents, then executes every task
    /// concurrently and prints a summary.
    Run {
        /// Scenario TOML file
        scenario: PathBuf,

        /// Policy TOML file (defaults to the built-in policy)
        #[arg(short, long)]
        policy: Option<PathBuf>,

        /// Override the policy's switching strategy (e.g. adaptive, manual, round-robin)
        #[arg(long)]
        strategy: Option<SwitchingStrategy>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Directory receiving a JSONL journal of iterations, switches and costs
        #[arg(long)]
        records_dir: Option<PathBuf>,

        /// Tasks allowed to run at the same time
        #[arg(long, default_value = "8")]
        max_concurrent: usize,
    },

    /// Classify a change request into a complexity bucket
    Classify {
        /// Estimated lines of change
        #[arg(long, default_value = "0")]
        loc: u32,

        /// Labels on the change request (repeatable)
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Change description
        #[arg(long)]
        description: Option<String>,

        /// Policy TOML file providing classifier thresholds
        #[arg(short, long)]
        policy: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the checkpoint iterations for a budget
    Checkpoints {
        /// Iteration budget (defaults to the policy's max_iterations)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Checkpoint fractions (defaults to the policy's)
        #[arg(long = "fraction")]
        fractions: Vec<f64>,

        /// Policy TOML file
        #[arg(short, long)]
        policy: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Policy management
    #[command(subcommand)]
    Policy(PolicyCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG wins over --log-level when set.
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Run { scenario, policy, strategy, json, records_dir, max_concurrent } => {
            commands::run::execute(RunOptions {
                scenario,
                policy,
                strategy,
                json,
                records_dir,
                max_concurrent,
            })
            .await?;
        }
        Command::Classify { loc, labels, description, policy, json } => {
            commands::classify::execute(loc, labels, description, policy, json)?;
        }
        Command::Checkpoints { max_iterations, fractions, policy, json } => {
            commands::checkpoints::execute(max_iterations, fractions, policy, json)?;
        }
        Command::Policy(cmd) => {
            commands::policy::execute(cmd)?;
        }
    }

    Ok(())
}
