// src/exec/task_runner.rs

//! Individual task runner.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dag::{ScheduledTask, TaskKind};
use crate::engine::{ActionFailure, RuntimeEvent, TaskOutcome};
use crate::errors::DagError;
use crate::exec::command::{CommandRunner, STDERR_TAIL_LINES};

/// Execute one attempt of a task and classify the result.
///
/// - `NoOp` succeeds immediately.
/// - `Command` runs through `runner`; a non-zero exit (or a spawn error) is
///   a failure carrying the tail of stderr.
/// - `BranchDecision` calls the task's decider with the run parameters.
///   Whether the chosen id is valid is checked by the scheduler.
pub async fn execute(task: &ScheduledTask, runner: &dyn CommandRunner) -> TaskOutcome {
    match &task.kind {
        TaskKind::NoOp => TaskOutcome::Success,

        TaskKind::Command { cmd } => match runner.run(&task.id, cmd).await {
            Ok(output) if output.success() => TaskOutcome::Success,
            Ok(output) => TaskOutcome::Failed(ActionFailure {
                exit_code: output.exit_code,
                message: output.stderr_tail(STDERR_TAIL_LINES),
            }),
            Err(err) => {
                let err = DagError::ActionExecution {
                    task: task.id.clone(),
                    message: format!("{err:#}"),
                };
                error!(task = %task.id, run_id = task.run_id, error = %err, "task execution error");
                TaskOutcome::Failed(ActionFailure::new(err.to_string()))
            }
        },

        TaskKind::BranchDecision { decider } => match decider.decide(&task.params) {
            Ok(chosen) => {
                debug!(task = %task.id, chosen = %chosen, "branch decider returned");
                TaskOutcome::Branched(chosen)
            }
            Err(err) => {
                warn!(task = %task.id, run_id = task.run_id, error = %err, "branch decider failed");
                TaskOutcome::Failed(ActionFailure::new(format!("branch decision failed: {err:#}")))
            }
        },
    }
}

/// Run a single task attempt and emit `TaskCompleted` with its outcome.
///
/// If the cancel channel fires, the attempt is dropped (killing any child
/// process) and **no** `TaskCompleted` event is sent for it.
pub async fn run_task(
    task: ScheduledTask,
    runner: Arc<dyn CommandRunner>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    debug!(
        task = %task.id,
        run_id = task.run_id,
        attempt = task.attempt,
        kind = task.kind.name(),
        "running task attempt"
    );

    tokio::select! {
        outcome = execute(&task, runner.as_ref()) => {
            let event = RuntimeEvent::TaskCompleted {
                task: task.id.clone(),
                attempt: task.attempt,
                outcome,
            };
            if runtime_tx.send(event).await.is_err() {
                debug!(task = %task.id, run_id = task.run_id, "runtime gone; dropping task result");
            }
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => {
                    info!(
                        task = %task.id,
                        run_id = task.run_id,
                        attempt = task.attempt,
                        "cancellation requested for running task; stopping it"
                    );
                }
                Err(_) => {
                    debug!(
                        task = %task.id,
                        run_id = task.run_id,
                        "cancel channel closed without explicit cancellation"
                    );
                }
            }
        }
    }
}
