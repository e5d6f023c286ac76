//! Run every task of a scenario through the orchestrator.

use super::load_policy;
use crate::scenario::{Scenario, ScriptedAgent, SimulatedSignals};
use anyhow::{Context, Result, bail};
use baton_abstraction::{ExecutionAgent, PersistenceSink, ProgressEvent};
use baton_orchestrator::{
    AgentRegistry, CostQualityModel, JsonlSink, MemoryStore, PolicyStore, ProgressReporter,
    SwitchingStrategy, TaskDispatcher, TaskDispatcherConfig, TaskExecutor, TaskOutcome,
    TaskStatus,
};
use colored::Colorize;
use comfy_table::{Cell, Color as ComfyColor, Table};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Journal file written under `--records-dir`.
const JOURNAL_FILE: &str = "records.jsonl";

/// Options for `baton run`.
#[derive(Debug)]
pub struct RunOptions {
    pub scenario: PathBuf,
    pub policy: Option<PathBuf>,
    pub strategy: Option<SwitchingStrategy>,
    pub json: bool,
    pub records_dir: Option<PathBuf>,
    pub max_concurrent: usize,
}

/// Per-task line of the run report.
#[derive(Debug, Serialize)]
struct TaskReport {
    request_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<TaskOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute run command.
pub async fn execute(options: RunOptions) -> Result<()> {
    let mut policy = load_policy(options.policy.as_deref())?;
    if let Some(strategy) = options.strategy {
        info!(%strategy, "Overriding policy switching strategy");
        policy.strategy = strategy;
    }
    let scenario = Scenario::load(&options.scenario)?;
    if scenario.tasks.is_empty() {
        bail!("Scenario {} declares no tasks", options.scenario.display());
    }

    let registry = Arc::new(AgentRegistry::new());
    let model = Arc::new(CostQualityModel::default());
    for declared in scenario.agents {
        let agent = Arc::new(ScriptedAgent::new(declared));
        model.seed(agent.id(), agent.prior());
        registry.register(agent).context("Failed to register scenario agent")?;
    }

    let persistence: Arc<dyn PersistenceSink> = match &options.records_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create records directory {}", dir.display()))?;
            let sink = JsonlSink::new(dir.join(JOURNAL_FILE));
            info!(path = %sink.path().display(), "Writing iteration journal");
            Arc::new(sink)
        }
        None => Arc::new(MemoryStore::new()),
    };
    let progress = Arc::new(ProgressReporter::new());
    let policies = Arc::new(PolicyStore::new(policy).context("Invalid policy")?);

    let executor = Arc::new(TaskExecutor::new(
        registry,
        model,
        Arc::new(SimulatedSignals),
        persistence,
        progress.clone(),
        policies,
    ));
    let dispatcher = Arc::new(TaskDispatcher::new(
        executor,
        TaskDispatcherConfig { max_concurrent_tasks: options.max_concurrent },
    ));

    let live = (!options.json).then(|| {
        let mut events = progress.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                print_event(&event);
            }
        })
    });
    let interrupt = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running tasks");
                dispatcher.cancel_all();
            }
        })
    };

    let refs: Vec<String> = scenario.tasks.iter().map(|t| t.request_ref.clone()).collect();
    let results = dispatcher.run_all(scenario.tasks).await;
    interrupt.abort();
    if let Some(live) = live {
        live.abort();
    }

    let reports: Vec<TaskReport> = refs
        .into_iter()
        .zip(results)
        .map(|(request_ref, result)| match result {
            Ok(outcome) => TaskReport { request_ref, outcome: Some(outcome), error: None },
            Err(e) => TaskReport { request_ref, outcome: None, error: Some(e.to_string()) },
        })
        .collect();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_summary(&reports);
        let metrics = progress.snapshot();
        println!();
        println!(
            "  {} {} completed, {} failed, {} cancelled, total cost ${:.4}",
            "✓".green(),
            metrics.completed_tasks,
            metrics.failed_tasks,
            metrics.cancelled_tasks,
            metrics.total_cost
        );
    }
    Ok(())
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Progress { task_id, iteration, agent_id, quality, total_cost } => {
            println!(
                "  {} iteration {} by {}: quality {:.3}, spent ${:.4}",
                short(task_id).dimmed(),
                iteration,
                agent_id.cyan(),
                quality,
                total_cost
            );
        }
        ProgressEvent::AgentSwitched { task_id, from_agent, to_agent, reason } => {
            println!(
                "  {} switched {} -> {} ({})",
                short(task_id).dimmed(),
                from_agent,
                to_agent.cyan(),
                reason.to_string().yellow()
            );
        }
        ProgressEvent::Completed { .. }
        | ProgressEvent::Failed { .. }
        | ProgressEvent::Cancelled { .. } => {}
    }
}

fn short(task_id: &str) -> &str {
    task_id.get(..8).unwrap_or(task_id)
}

fn print_summary(reports: &[TaskReport]) {
    let mut table = Table::new();
    table.set_header(vec![
        "Request", "Status", "Reason", "Iterations", "Switches", "Quality", "Cost", "Agents",
    ]);

    for report in reports {
        let Some(outcome) = &report.outcome else {
            table.add_row(vec![
                Cell::new(&report.request_ref),
                Cell::new("rejected").fg(ComfyColor::Red),
                Cell::new(report.error.as_deref().unwrap_or_default()),
            ]);
            continue;
        };

        let status = outcome.status();
        let color = match status {
            TaskStatus::Completed => ComfyColor::Green,
            TaskStatus::Cancelled => ComfyColor::Yellow,
            _ => ComfyColor::Red,
        };
        let mut agents: Vec<&str> = Vec::new();
        for record in &outcome.iterations {
            if agents.last() != Some(&record.agent_id.as_str()) {
                agents.push(&record.agent_id);
            }
        }

        table.add_row(vec![
            Cell::new(&report.request_ref),
            Cell::new(status.to_string()).fg(color),
            Cell::new(outcome.reason.to_string()),
            Cell::new(outcome.iterations.len()),
            Cell::new(outcome.switch_events.len()),
            Cell::new(format!("{:.3}", outcome.final_quality)),
            Cell::new(format!("${:.4}", outcome.total_cost)),
            Cell::new(agents.join(" -> ")),
        ]);
    }

    println!("{}", table);
}
