// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::dag::{RunPhase, ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::notify::{NotifyPolicy, RunEvent};
use crate::engine::{RunOptions, TaskOutcome};
use crate::errors::Result;
use crate::types::TaskId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Post `RetryDue` for this task once `delay` has elapsed.
    ScheduleRetry { task: TaskId, delay: Duration },
    /// Post `SlaDeadline` for this task once `after` has elapsed.
    ArmSlaTimer { task: TaskId, after: Duration },
    /// Ask the executor to stop these tasks; their results are discarded.
    CancelTasks(Vec<TaskId>),
    /// Deliver these notifications (already filtered by the notify policy).
    Notify(Vec<RunEvent>),
    /// The run is over; the shell should stop once commands are applied.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    /// Tasks dispatched by this step, across all `DispatchTasks` commands.
    pub fn dispatched(&self) -> Vec<&ScheduledTask> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Notifications emitted by this step.
    pub fn notifications(&self) -> Vec<&RunEvent> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Notify(events) => Some(events.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Start the run.
pub fn handle_run_start(
    scheduler: &mut Scheduler,
    options: &RunOptions,
    now: Instant,
) -> Result<CoreStep> {
    let step = scheduler.start(now)?;
    Ok(into_core_step(step, &options.notify))
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    options: &RunOptions,
    task: TaskId,
    attempt: u32,
    outcome: TaskOutcome,
    now: Instant,
) -> Result<CoreStep> {
    debug!(task = %task, attempt, ?outcome, "handling task completion");
    let step = scheduler.handle_completion(&task, attempt, outcome, now)?;
    Ok(into_core_step(step, &options.notify))
}

/// Handle an elapsed retry delay.
pub fn handle_retry_due(
    scheduler: &mut Scheduler,
    options: &RunOptions,
    task: TaskId,
    now: Instant,
) -> Result<CoreStep> {
    let step = scheduler.handle_retry_due(&task, now)?;
    Ok(into_core_step(step, &options.notify))
}

/// Handle an elapsed SLA timer.
pub fn handle_sla_deadline(
    scheduler: &mut Scheduler,
    options: &RunOptions,
    task: TaskId,
    now: Instant,
) -> CoreStep {
    let step = scheduler.handle_sla_deadline(&task, now);
    into_core_step(step, &options.notify)
}

/// Handle a shutdown request: cancel what is running and end the run.
pub fn handle_shutdown(scheduler: &mut Scheduler, options: &RunOptions, now: Instant) -> CoreStep {
    let step = scheduler.halt("shutdown requested", now);
    let mut core = into_core_step(step, &options.notify);
    if core.keep_running {
        core.keep_running = false;
        core.commands.push(CoreCommand::RequestExit);
    }
    core
}

/// Translate a scheduler pass into shell commands.
///
/// Cancellations go first so the executor stops old work before anything
/// new is dispatched.
fn into_core_step(step: SchedulerStep, policy: &NotifyPolicy) -> CoreStep {
    let SchedulerStep {
        dispatched,
        retries,
        sla_timers,
        cancelled,
        events,
        run_finished,
    } = step;

    let mut commands = Vec::new();

    if !cancelled.is_empty() {
        commands.push(CoreCommand::CancelTasks(cancelled));
    }
    if !dispatched.is_empty() {
        commands.push(CoreCommand::DispatchTasks(dispatched));
    }
    commands.extend(
        retries
            .into_iter()
            .map(|(task, delay)| CoreCommand::ScheduleRetry { task, delay }),
    );
    commands.extend(
        sla_timers
            .into_iter()
            .map(|(task, after)| CoreCommand::ArmSlaTimer { task, after }),
    );

    let events: Vec<RunEvent> = events.into_iter().filter(|e| policy.allows(e)).collect();
    if !events.is_empty() {
        commands.push(CoreCommand::Notify(events));
    }

    let keep_running = !matches!(run_finished, Some(RunPhase::Completed | RunPhase::Failed));
    if !keep_running {
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
