// src/exec/executor_loop.rs

//! Main executor loop that manages running task attempts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::command::CommandRunner;
use crate::exec::task_runner::run_task;
use crate::types::TaskId;

/// Request sent from the runtime to the executor loop.
#[derive(Debug, Clone)]
pub enum ExecutorRequest {
    /// Start an attempt of this task.
    Run(ScheduledTask),
    /// Stop these tasks if they are still running.
    Cancel(Vec<TaskId>),
}

/// Internal handle for a currently-running task attempt.
///
/// - `cancel` is used by the executor to request that the attempt be stopped
///   (fail-fast or shutdown).
/// - `handle` is the Tokio task that is actually running it.
struct ActiveTask {
    attempt: u32,
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each scheduled task is executed in its own Tokio task, so tasks
/// dispatched together run in parallel. Per task id only the newest attempt
/// is tracked. The scheduler dispatches attempt N+1 only after attempt N has
/// reported, so an older entry still in the map is one whose tokio task has
/// not quite exited yet.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    runner: Arc<dyn CommandRunner>,
) -> mpsc::Sender<ExecutorRequest> {
    let (tx, mut rx) = mpsc::channel::<ExecutorRequest>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<TaskId, ActiveTask> = HashMap::new();

        while let Some(request) = rx.recv().await {
            active.retain(|_, t| !t.handle.is_finished());

            match request {
                ExecutorRequest::Run(task) => {
                    handle_scheduled_task(task, &mut active, &runner, &runtime_tx);
                }
                ExecutorRequest::Cancel(ids) => {
                    for id in ids {
                        cancel_task(&id, &mut active);
                    }
                }
            }
        }

        // Runtime is gone; stop anything still running.
        for (id, mut task) in active.drain() {
            if let Some(cancel) = task.cancel.take() {
                debug!(task = %id, "executor shutting down; cancelling task");
                let _ = cancel.send(());
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

/// Handle a newly scheduled task.
fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<TaskId, ActiveTask>,
    runner: &Arc<dyn CommandRunner>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let id = task.id.clone();

    if let Some(existing) = active.get(&id) {
        if existing.attempt >= task.attempt {
            warn!(
                task = %id,
                run_id = task.run_id,
                running_attempt = existing.attempt,
                new_attempt = task.attempt,
                "task dispatched while the same attempt is still running; ignoring"
            );
            return;
        }
        // The older attempt has already reported; its tokio task is just
        // winding down. Leave it detached.
        debug!(
            task = %id,
            previous_attempt = existing.attempt,
            new_attempt = task.attempt,
            "replacing finished attempt"
        );
        active.remove(&id);
    }

    // Create a fresh cancel channel and spawn the attempt.
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let runner = Arc::clone(runner);
    let attempt = task.attempt;
    let spawn_id = id.clone();

    let handle = tokio::spawn(async move {
        run_task(task, runner, rt_tx, cancel_rx).await;
        debug!(task = %spawn_id, "task runner future finished");
    });

    active.insert(
        id,
        ActiveTask {
            attempt,
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

/// Cancel a running task attempt, if any.
fn cancel_task(id: &str, active: &mut HashMap<TaskId, ActiveTask>) {
    let Some(mut existing) = active.remove(id) else {
        debug!(task = %id, "cancel requested but task is not running");
        return;
    };

    info!(task = %id, attempt = existing.attempt, "cancelling running task");

    if let Some(cancel) = existing.cancel.take() {
        if cancel.send(()).is_err() {
            debug!(task = %id, "task already finished while cancelling");
        }
    }
}
