// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::model::ConfigFile;
use crate::dag::{RunReport, Scheduler, TaskKind};
use crate::engine::{CoreRuntime, NotificationSink, Runtime, RuntimeEvent, TracingSink};
use crate::exec::RealExecutorBackend;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - scheduler / core / runtime
/// - executor
/// - Ctrl-C handling
///
/// Returns `None` for `--dry-run`, otherwise the report of the run.
pub async fn run(args: CliArgs) -> Result<Option<RunReport>> {
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let mut cfg = load_and_validate(&config_path)?.with_params(args.params.clone());
    if args.fail_fast {
        cfg.options.fail_fast = true;
    }

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(None);
    }

    let report = run_dag(&cfg, Arc::new(TracingSink)).await?;
    print_summary(&report);
    Ok(Some(report))
}

/// Run a validated DAG once with the real executor, delivering
/// notifications to `sink`. Ctrl-C requests a graceful shutdown.
pub async fn run_dag(cfg: &ConfigFile, sink: Arc<dyn NotificationSink>) -> Result<RunReport> {
    let scheduler = Scheduler::from_config(cfg);
    info!(
        run_id = scheduler.run_id(),
        dag = %cfg.dag.name(),
        params = ?cfg.params,
        fail_fast = cfg.options.fail_fast,
        "preparing DAG run"
    );

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Process executor backend (real implementation in production).
    let executor = RealExecutorBackend::new(rt_tx.clone());

    // Ctrl-C → graceful shutdown.
    let ctrl_c = {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        })
    };

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(scheduler, cfg.options);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, rt_rx, rt_tx, executor).with_sink(sink);
    let result = runtime.run().await;
    ctrl_c.abort();

    Ok(result?)
}

/// Simple dry-run output: print metadata, tasks and edges in topological
/// order.
fn print_dry_run(cfg: &ConfigFile) {
    let dag = &cfg.dag;
    let meta = dag.meta();

    println!("branchdag dry-run: {}", meta.name);
    if let Some(ref description) = meta.description {
        println!("  description: {description}");
    }
    if let Some(ref owner) = meta.owner {
        println!("  owner: {owner}");
    }
    if !meta.tags.is_empty() {
        println!("  tags: {:?}", meta.tags);
    }
    println!("  config.fail_fast = {}", cfg.options.fail_fast);
    println!("  config.notify = {:?}", cfg.options.notify);
    if !cfg.params.is_empty() {
        println!("  params: {:?}", cfg.params);
    }
    println!();

    println!("tasks ({}, topological order):", dag.graph().len());
    for task in dag.tasks_in_order() {
        println!("  - {} [{}]", task.id, task.kind.name());
        match &task.kind {
            TaskKind::Command { cmd } => println!("      cmd: {cmd}"),
            TaskKind::BranchDecision { decider } => {
                if let Some(candidates) = decider.candidates() {
                    println!("      chooses one of: {:?}", candidates);
                }
            }
            TaskKind::NoOp => {}
        }
        let after = dag.graph().predecessors_of(&task.id);
        if !after.is_empty() {
            println!("      after: {:?}", after);
        }
        println!("      trigger_rule: {}", task.trigger_rule);
        if task.retry_limit > 0 {
            println!(
                "      retries: {} (delay {:?})",
                task.retry_limit, task.retry_delay
            );
        }
        if let Some(sla) = task.sla {
            println!("      sla: {:?}", sla);
        }
    }

    debug!("dry-run complete (no execution)");
}

/// Per-task outcome table printed after a run.
fn print_summary(report: &RunReport) {
    println!(
        "run {} of '{}': {}",
        report.run_id, report.dag_name, report.phase
    );
    for (id, task) in report.tasks.iter() {
        let mut line = format!("  {id:<24} {}", task.state);
        if task.retry_count > 0 {
            line.push_str(&format!(" retries={}", task.retry_count));
        }
        if let Some(ref chosen) = task.chosen_branch {
            line.push_str(&format!(" -> {chosen}"));
        }
        if task.sla_breached {
            line.push_str(" (sla missed)");
        }
        if let Some(d) = task.duration {
            line.push_str(&format!(" {:.2?}", d));
        }
        println!("{line}");
        if let Some(ref err) = task.last_error {
            if task.state.is_failure() && !err.is_empty() {
                for err_line in err.lines() {
                    println!("      {err_line}");
                }
            }
        }
    }
}
