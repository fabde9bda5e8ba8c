use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::model::ConfigFile;
use crate::dag::branch::resolve_branch;
use crate::dag::definition::Dag;
use crate::dag::report::{RunPhase, RunReport, TaskReport};
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{RunState, StateManager};
use crate::dag::task_info::{ScheduledTask, TaskState};
use crate::dag::trigger::Readiness;
use crate::engine::notify::RunEvent;
use crate::engine::TaskOutcome;
use crate::errors::{DagError, Result};
use crate::types::{RunParams, TaskId};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-wide monotonically increasing run id.
pub fn next_run_id() -> u64 {
    RUN_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// Scheduler holds the immutable DAG plus the mutable state of one run.
///
/// It is responsible for:
/// - deciding which pending tasks are eligible (trigger rules)
/// - committing task results, including branch decisions
/// - propagating skips and upstream failures to a fixed point
/// - applying retry and SLA policy
/// - deciding when the run is finished, and how
///
/// Every public `handle_*` method is one scheduling pass: it reads the
/// current state, commits the change, and returns a [`SchedulerStep`]
/// describing the IO the caller has to perform. It never performs IO itself.
#[derive(Debug)]
pub struct Scheduler {
    dag: Arc<Dag>,
    state: RunState,
    params: Arc<RunParams>,
    run_id: u64,
    fail_fast: bool,
    phase: RunPhase,
}

impl Scheduler {
    pub fn new(dag: Arc<Dag>, params: RunParams, run_id: u64, fail_fast: bool) -> Self {
        let state = RunState::new(&dag);
        Self {
            dag,
            state,
            params: Arc::new(params),
            run_id,
            fail_fast,
            phase: RunPhase::Initializing,
        }
    }

    /// Construct a scheduler for a fresh run of a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(
            Arc::clone(&cfg.dag),
            cfg.params.clone(),
            next_run_id(),
            cfg.options.fail_fast,
        )
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.state.state_of(&self.dag, task)
    }

    pub fn retry_count(&self, task: &str) -> Option<u32> {
        self.state.retry_count(&self.dag, task)
    }

    /// Current trigger classification of a task. Read-only.
    pub fn readiness_of(&self, task: &str) -> Option<Readiness> {
        self.state.readiness_of(&self.dag, task)
    }

    fn tasks_in(&self, state: TaskState) -> Vec<TaskId> {
        self.dag
            .graph()
            .topo_order()
            .filter(|id| self.state_of(id) == Some(state))
            .map(str::to_string)
            .collect()
    }

    /// Begin the run: dispatch every task whose trigger rule is already
    /// satisfied (at least the roots).
    pub fn start(&mut self, now: Instant) -> Result<SchedulerStep> {
        let mut step = SchedulerStep::default();

        if self.phase != RunPhase::Initializing {
            warn!(run_id = self.run_id, phase = %self.phase, "start called twice; ignoring");
            return Ok(step);
        }

        self.phase = RunPhase::Running;
        info!(
            run_id = self.run_id,
            dag = %self.dag.name(),
            tasks = self.dag.graph().len(),
            "starting DAG run"
        );

        self.finish_pass(&mut step, now)?;
        Ok(step)
    }

    /// Commit the result of one attempt of `task`.
    ///
    /// Results for attempts that are no longer current (cancelled tasks, a run
    /// that already ended) are discarded.
    pub fn handle_completion(
        &mut self,
        task: &str,
        attempt: u32,
        outcome: TaskOutcome,
        now: Instant,
    ) -> Result<SchedulerStep> {
        let mut step = SchedulerStep::default();

        if self.phase != RunPhase::Running {
            debug!(task = %task, run_id = self.run_id, "run not active; discarding result");
            return Ok(step);
        }

        let dag = Arc::clone(&self.dag);
        let Some(def) = dag.task(task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return Ok(step);
        };

        let Some(record) = self.state.record_mut(&dag, task) else {
            return Ok(step);
        };
        if record.state != TaskState::Running || record.awaiting_retry || record.attempts != attempt
        {
            debug!(
                task = %task,
                run_id = self.run_id,
                attempt,
                state = %record.state,
                "stale completion; discarding result"
            );
            return Ok(step);
        }

        match outcome {
            TaskOutcome::Success if def.kind.is_branch() => {
                self.fail_task(
                    task,
                    "branch task finished without choosing a successor".to_string(),
                    &mut step,
                    now,
                );
            }
            TaskOutcome::Success => self.succeed_task(task, &mut step, now),
            TaskOutcome::Branched(chosen) if def.kind.is_branch() => {
                match resolve_branch(&dag, &mut self.state, task, &chosen) {
                    Ok(resolution) => {
                        if let Some(record) = self.state.record_mut(&dag, task) {
                            record.finished_at = Some(now);
                        }
                        step.events.push(RunEvent::TaskSucceeded {
                            run_id: self.run_id,
                            task: task.to_string(),
                        });
                        self.push_settled_events(&resolution.settled, &mut step);
                    }
                    Err(err) => {
                        error!(task = %task, run_id = self.run_id, error = %err, "branch resolution failed");
                        self.fail_task(task, err.to_string(), &mut step, now);
                    }
                }
            }
            TaskOutcome::Branched(chosen) => {
                warn!(
                    task = %task,
                    chosen = %chosen,
                    "non-branch task reported a branch choice; treating as success"
                );
                self.succeed_task(task, &mut step, now);
            }
            TaskOutcome::Failed(failure) => {
                let retries_left = record.retry_count < def.retry_limit;
                if retries_left {
                    record.retry_count += 1;
                    record.awaiting_retry = true;
                    record.last_error = Some(failure.to_string());
                    let retry = record.retry_count;

                    warn!(
                        task = %task,
                        run_id = self.run_id,
                        attempt,
                        retry,
                        retry_limit = def.retry_limit,
                        delay = ?def.retry_delay,
                        error = %failure,
                        "task failed; scheduling retry"
                    );

                    step.retries.push((task.to_string(), def.retry_delay));
                    step.events.push(RunEvent::TaskRetried {
                        run_id: self.run_id,
                        task: task.to_string(),
                        retry,
                        delay: def.retry_delay,
                        error: failure.to_string(),
                    });
                } else {
                    self.fail_task(task, failure.to_string(), &mut step, now);
                }
            }
        }

        self.finish_pass(&mut step, now)?;
        Ok(step)
    }

    /// Re-dispatch a task whose retry delay has elapsed.
    pub fn handle_retry_due(&mut self, task: &str, now: Instant) -> Result<SchedulerStep> {
        let mut step = SchedulerStep::default();

        if self.phase != RunPhase::Running {
            return Ok(step);
        }

        let dag = Arc::clone(&self.dag);
        let (Some(def), Some(record)) = (dag.task(task), self.state.record_mut(&dag, task)) else {
            warn!(task = %task, "retry for unknown task; ignoring");
            return Ok(step);
        };

        if record.state != TaskState::Running || !record.awaiting_retry {
            debug!(task = %task, state = %record.state, "retry no longer wanted; ignoring");
            return Ok(step);
        }

        record.awaiting_retry = false;
        record.attempts += 1;
        let attempt = record.attempts;

        info!(task = %task, run_id = self.run_id, attempt, "re-dispatching task after retry delay");

        step.events.push(RunEvent::TaskStarted {
            run_id: self.run_id,
            task: task.to_string(),
            attempt,
        });
        step.dispatched.push(ScheduledTask::from_task_def(
            def,
            attempt,
            self.run_id,
            Arc::clone(&self.params),
        ));

        self.finish_pass(&mut step, now)?;
        Ok(step)
    }

    /// Check a task's SLA. Emits at most one `SlaBreached` per task; never
    /// changes the task's state.
    pub fn handle_sla_deadline(&mut self, task: &str, now: Instant) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.phase != RunPhase::Running {
            return step;
        }

        let dag = Arc::clone(&self.dag);
        let Some(sla) = dag.task(task).and_then(|d| d.sla) else {
            return step;
        };
        let Some(record) = self.state.record_mut(&dag, task) else {
            return step;
        };

        if record.state != TaskState::Running || record.sla_breached {
            return step;
        }
        let Some(started) = record.started_at else {
            return step;
        };

        let elapsed = now.saturating_duration_since(started);
        if elapsed >= sla {
            record.sla_breached = true;
            warn!(task = %task, run_id = self.run_id, ?sla, ?elapsed, "task exceeded its SLA");
            step.events.push(RunEvent::SlaBreached {
                run_id: self.run_id,
                task: task.to_string(),
                sla,
                elapsed,
            });
        } else {
            // Timer fired early; watch the remainder.
            step.sla_timers.push((task.to_string(), sla - elapsed));
        }

        step
    }

    /// Stop the run: running tasks are cancelled and marked `Failed`, pending
    /// ones become `UpstreamFailed`. The run ends `Failed`.
    pub fn halt(&mut self, reason: &str, now: Instant) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.phase.is_terminal() {
            return step;
        }

        warn!(run_id = self.run_id, reason = %reason, "halting DAG run");
        self.phase = RunPhase::Running;
        self.halt_inner(reason, &mut step, now);

        // Every task is terminal now, so this cannot report a deadlock.
        if let Err(err) = self.finish_pass(&mut step, now) {
            error!(run_id = self.run_id, error = %err, "unexpected error while halting");
        }
        step
    }

    /// Snapshot of every task's outcome.
    pub fn report(&self) -> RunReport {
        let tasks = self
            .dag
            .graph()
            .tasks()
            .filter_map(|id| {
                let r = self.state.record(&self.dag, id)?;
                let duration = match (r.started_at, r.finished_at) {
                    (Some(s), Some(f)) => Some(f.saturating_duration_since(s)),
                    _ => None,
                };
                Some((
                    id.to_string(),
                    TaskReport {
                        state: r.state,
                        retry_count: r.retry_count,
                        attempts: r.attempts,
                        sla_breached: r.sla_breached,
                        chosen_branch: r.chosen_branch.clone(),
                        last_error: r.last_error.clone(),
                        duration,
                    },
                ))
            })
            .collect();

        RunReport {
            run_id: self.run_id,
            dag_name: self.dag.name().to_string(),
            phase: self.phase,
            tasks,
        }
    }

    fn succeed_task(&mut self, task: &str, step: &mut SchedulerStep, now: Instant) {
        if let Some(record) = self.state.record_mut(&self.dag, task) {
            record.state = TaskState::Success;
            record.finished_at = Some(now);
        }
        debug!(task = %task, run_id = self.run_id, "task completed successfully");
        step.events.push(RunEvent::TaskSucceeded {
            run_id: self.run_id,
            task: task.to_string(),
        });
    }

    /// Terminal failure: no (more) retries. Dependents settle through the
    /// trigger evaluator; with fail-fast the whole run halts.
    fn fail_task(&mut self, task: &str, error: String, step: &mut SchedulerStep, now: Instant) {
        let dag = Arc::clone(&self.dag);

        if let Some(record) = self.state.record_mut(&dag, task) {
            record.state = TaskState::Failed;
            record.awaiting_retry = false;
            record.finished_at = Some(now);
            record.last_error = Some(error.clone());
        }

        warn!(task = %task, run_id = self.run_id, error = %error, "task failed");
        step.events.push(RunEvent::TaskFailed {
            run_id: self.run_id,
            task: task.to_string(),
            upstream: false,
            error,
        });

        let settled = StateManager::new(&dag, &mut self.state).settle_downstream(&[task.to_string()]);
        self.push_settled_events(&settled, step);

        if self.fail_fast {
            self.halt_inner(&format!("fail-fast: task '{task}' failed"), step, now);
        }
    }

    fn halt_inner(&mut self, reason: &str, step: &mut SchedulerStep, now: Instant) {
        let dag = Arc::clone(&self.dag);

        for id in dag.graph().topo_order() {
            let Some(record) = self.state.record_mut(&dag, id) else {
                continue;
            };
            match record.state {
                TaskState::Running => {
                    record.state = TaskState::Failed;
                    record.awaiting_retry = false;
                    record.finished_at = Some(now);
                    record.last_error = Some(format!("cancelled: {reason}"));
                    step.cancelled.push(id.to_string());
                    step.events.push(RunEvent::TaskFailed {
                        run_id: self.run_id,
                        task: id.to_string(),
                        upstream: false,
                        error: format!("cancelled: {reason}"),
                    });
                }
                TaskState::Pending => {
                    record.state = TaskState::UpstreamFailed;
                    record.last_error = Some(reason.to_string());
                    step.events.push(RunEvent::TaskFailed {
                        run_id: self.run_id,
                        task: id.to_string(),
                        upstream: true,
                        error: reason.to_string(),
                    });
                }
                _ => {}
            }
        }
    }

    fn push_settled_events(&mut self, settled: &[(TaskId, TaskState)], step: &mut SchedulerStep) {
        for (id, state) in settled {
            match state {
                TaskState::Skipped => {
                    debug!(task = %id, run_id = self.run_id, "task skipped");
                    step.events.push(RunEvent::TaskSkipped {
                        run_id: self.run_id,
                        task: id.clone(),
                    });
                }
                TaskState::UpstreamFailed => {
                    if let Some(record) = self.state.record_mut(&self.dag, id) {
                        record.last_error = Some("upstream failed".to_string());
                    }
                    debug!(task = %id, run_id = self.run_id, "task marked upstream_failed");
                    step.events.push(RunEvent::TaskFailed {
                        run_id: self.run_id,
                        task: id.clone(),
                        upstream: true,
                        error: "upstream failed".to_string(),
                    });
                }
                _ => {}
            }
        }
    }

    /// Common tail of every pass: settle what can no longer run, dispatch
    /// what became eligible, then decide whether the run is over.
    fn finish_pass(&mut self, step: &mut SchedulerStep, now: Instant) -> Result<()> {
        if self.phase == RunPhase::Running {
            let dag = Arc::clone(&self.dag);
            let settled = StateManager::new(&dag, &mut self.state).settle_all_pending();
            self.push_settled_events(&settled, step);
            self.dispatch_ready(step, now);
        }

        self.maybe_finish_run(step)
    }

    fn dispatch_ready(&mut self, step: &mut SchedulerStep, now: Instant) {
        let dag = Arc::clone(&self.dag);
        let ready = StateManager::new(&dag, &mut self.state).eligible_tasks();

        for id in ready {
            let (Some(def), Some(record)) = (dag.task(&id), self.state.record_mut(&dag, &id)) else {
                continue;
            };

            record.state = TaskState::Running;
            record.attempts += 1;
            let attempt = record.attempts;

            if record.started_at.is_none() {
                record.started_at = Some(now);
                if let Some(sla) = def.sla {
                    step.sla_timers.push((id.clone(), sla));
                }
            }

            info!(
                task = %id,
                run_id = self.run_id,
                kind = def.kind.name(),
                attempt,
                "dependencies satisfied; dispatching task"
            );

            step.events.push(RunEvent::TaskStarted {
                run_id: self.run_id,
                task: id.clone(),
                attempt,
            });
            step.dispatched.push(ScheduledTask::from_task_def(
                def,
                attempt,
                self.run_id,
                Arc::clone(&self.params),
            ));
        }
    }

    /// End the run once every task is terminal; report a deadlock if tasks
    /// are still pending but nothing is running that could unblock them.
    fn maybe_finish_run(&mut self, step: &mut SchedulerStep) -> Result<()> {
        if self.phase != RunPhase::Running {
            return Ok(());
        }

        if self.state.all_terminal() {
            let failed: Vec<TaskId> = self
                .dag
                .graph()
                .topo_order()
                .filter(|id| self.state_of(id).is_some_and(|s| s.is_failure()))
                .map(str::to_string)
                .collect();

            if failed.is_empty() {
                self.phase = RunPhase::Completed;
                info!(run_id = self.run_id, "all tasks terminal; run completed");
                step.events.push(RunEvent::RunCompleted { run_id: self.run_id });
            } else {
                self.phase = RunPhase::Failed;
                warn!(run_id = self.run_id, ?failed, "all tasks terminal; run failed");
                step.events.push(RunEvent::RunFailed {
                    run_id: self.run_id,
                    failed,
                });
            }
            step.run_finished = Some(self.phase);
            return Ok(());
        }

        if self.state.count_in(TaskState::Running) == 0 {
            let pending = self.tasks_in(TaskState::Pending);
            self.phase = RunPhase::Failed;
            error!(run_id = self.run_id, ?pending, "no task running but tasks still pending");
            return Err(DagError::SchedulingDeadlock(format!(
                "run {}: {} task(s) pending with nothing running: {:?}",
                self.run_id,
                pending.len(),
                pending
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dag::definition::{DagDefinition, DagMeta};
    use crate::dag::task_info::{Edge, TaskDef};
    use crate::engine::ActionFailure;
    use crate::types::TriggerRule;

    fn build(tasks: Vec<TaskDef>, edges: Vec<Edge>) -> Arc<Dag> {
        Arc::new(
            Dag::new(DagDefinition {
                meta: DagMeta {
                    name: "unit".into(),
                    ..DagMeta::default()
                },
                tasks,
                edges,
            })
            .unwrap(),
        )
    }

    fn fail(code: i32) -> TaskOutcome {
        TaskOutcome::Failed(ActionFailure::exit(code, ""))
    }

    #[test]
    fn roots_dispatch_on_start() {
        let dag = build(
            vec![TaskDef::noop("A"), TaskDef::noop("B"), TaskDef::noop("C")],
            vec![Edge::new("A", "C"), Edge::new("B", "C")],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let step = s.start(Instant::now()).unwrap();

        assert_eq!(step.dispatched_ids(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(s.phase(), RunPhase::Running);
        assert_eq!(s.state_of("C"), Some(TaskState::Pending));
        assert_eq!(s.readiness_of("C"), Some(Readiness::WaitingOnPredecessors));
    }

    #[test]
    fn chain_completes() {
        let dag = build(
            vec![TaskDef::noop("A"), TaskDef::noop("B")],
            vec![Edge::new("A", "B")],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let now = Instant::now();
        s.start(now).unwrap();

        let step = s.handle_completion("A", 1, TaskOutcome::Success, now).unwrap();
        assert_eq!(step.dispatched_ids(), vec!["B".to_string()]);

        let step = s.handle_completion("B", 1, TaskOutcome::Success, now).unwrap();
        assert_eq!(step.run_finished, Some(RunPhase::Completed));
        assert!(step.events.contains(&RunEvent::RunCompleted { run_id: 1 }));
    }

    #[test]
    fn retry_then_success() {
        let dag = build(
            vec![TaskDef::noop("A").with_retries(2, Duration::from_secs(5))],
            vec![],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let now = Instant::now();
        s.start(now).unwrap();

        let step = s.handle_completion("A", 1, fail(1), now).unwrap();
        assert_eq!(step.retries, vec![("A".to_string(), Duration::from_secs(5))]);
        assert_eq!(s.state_of("A"), Some(TaskState::Running));

        // Completion of the failed attempt arriving twice is ignored.
        assert!(s.handle_completion("A", 1, fail(1), now).unwrap().is_empty());

        let step = s.handle_retry_due("A", now).unwrap();
        assert_eq!(step.dispatched[0].attempt, 2);

        s.handle_completion("A", 2, fail(1), now).unwrap();
        s.handle_retry_due("A", now).unwrap();
        let step = s.handle_completion("A", 3, TaskOutcome::Success, now).unwrap();

        assert_eq!(step.run_finished, Some(RunPhase::Completed));
        assert_eq!(s.retry_count("A"), Some(2));
        assert_eq!(s.report().tasks["A"].attempts, 3);
    }

    #[test]
    fn retries_exhausted_fails_run() {
        let dag = build(
            vec![TaskDef::noop("A").with_retries(1, Duration::ZERO), TaskDef::noop("B")],
            vec![Edge::new("A", "B")],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let now = Instant::now();
        s.start(now).unwrap();
        s.handle_completion("A", 1, fail(2), now).unwrap();
        s.handle_retry_due("A", now).unwrap();
        let step = s.handle_completion("A", 2, fail(2), now).unwrap();

        assert_eq!(step.run_finished, Some(RunPhase::Failed));
        assert_eq!(s.state_of("A"), Some(TaskState::Failed));
        assert_eq!(s.state_of("B"), Some(TaskState::UpstreamFailed));
        assert_eq!(s.report().tasks["A"].last_error.as_deref(), Some("exit code 2"));
    }

    #[test]
    fn unrelated_branch_still_completes_after_failure() {
        let dag = build(
            vec![TaskDef::noop("A"), TaskDef::noop("A2"), TaskDef::noop("B")],
            vec![Edge::new("A", "A2")],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let now = Instant::now();
        s.start(now).unwrap();

        let step = s.handle_completion("A", 1, fail(1), now).unwrap();
        assert!(step.cancelled.is_empty());
        assert_eq!(s.state_of("B"), Some(TaskState::Running));

        let step = s.handle_completion("B", 1, TaskOutcome::Success, now).unwrap();
        assert_eq!(step.run_finished, Some(RunPhase::Failed));
        assert_eq!(s.state_of("B"), Some(TaskState::Success));
    }

    #[test]
    fn fail_fast_cancels_running_tasks() {
        let dag = build(
            vec![TaskDef::noop("A"), TaskDef::noop("B"), TaskDef::noop("C")],
            vec![Edge::new("B", "C")],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, true);
        let now = Instant::now();
        s.start(now).unwrap();

        let step = s.handle_completion("A", 1, fail(1), now).unwrap();

        assert_eq!(step.cancelled, vec!["B".to_string()]);
        assert_eq!(step.run_finished, Some(RunPhase::Failed));
        assert_eq!(s.state_of("C"), Some(TaskState::UpstreamFailed));

        // B's late result is discarded.
        assert!(s.handle_completion("B", 1, TaskOutcome::Success, now).unwrap().is_empty());
        assert_eq!(s.state_of("B"), Some(TaskState::Failed));
    }

    #[test]
    fn invalid_branch_choice_fails_without_retry() {
        let dag = build(
            vec![
                TaskDef::branch("pick", |_: &RunParams| Ok::<_, anyhow::Error>("X".to_string()))
                    .with_retries(3, Duration::ZERO),
                TaskDef::noop("X"),
                TaskDef::noop("Y"),
            ],
            vec![Edge::new("pick", "X"), Edge::new("pick", "Y")],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let now = Instant::now();
        s.start(now).unwrap();

        let step = s
            .handle_completion("pick", 1, TaskOutcome::Branched("nope".into()), now)
            .unwrap();

        assert!(step.retries.is_empty());
        assert_eq!(s.state_of("pick"), Some(TaskState::Failed));
        assert_eq!(s.state_of("X"), Some(TaskState::UpstreamFailed));
        assert_eq!(s.state_of("Y"), Some(TaskState::UpstreamFailed));
        assert_eq!(step.run_finished, Some(RunPhase::Failed));
    }

    #[test]
    fn sla_breach_is_reported_once() {
        let dag = build(
            vec![TaskDef::noop("A").with_sla(Duration::from_millis(10))],
            vec![],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let start = Instant::now();
        let step = s.start(start).unwrap();
        assert_eq!(step.sla_timers, vec![("A".to_string(), Duration::from_millis(10))]);

        // Early timer re-arms for the remainder.
        let early = s.handle_sla_deadline("A", start + Duration::from_millis(4));
        assert!(early.events.is_empty());
        assert_eq!(early.sla_timers, vec![("A".to_string(), Duration::from_millis(6))]);

        let late = start + Duration::from_millis(20);
        let step = s.handle_sla_deadline("A", late);
        assert_eq!(step.events.len(), 1);
        assert!(s.handle_sla_deadline("A", late).events.is_empty());

        let step = s.handle_completion("A", 1, TaskOutcome::Success, late).unwrap();
        assert_eq!(step.run_finished, Some(RunPhase::Completed));
        assert!(s.report().tasks["A"].sla_breached);
    }

    #[test]
    fn halt_before_completion_fails_run() {
        let dag = build(
            vec![TaskDef::noop("A"), TaskDef::noop("B")],
            vec![Edge::new("A", "B")],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let now = Instant::now();
        s.start(now).unwrap();

        let step = s.halt("shutdown requested", now);
        assert_eq!(step.cancelled, vec!["A".to_string()]);
        assert_eq!(step.run_finished, Some(RunPhase::Failed));
        assert_eq!(s.state_of("B"), Some(TaskState::UpstreamFailed));
    }

    #[test]
    fn one_success_join_with_all_paths_failed_is_skipped() {
        let dag = build(
            vec![
                TaskDef::noop("A"),
                TaskDef::noop("B"),
                TaskDef::noop("J").with_trigger_rule(TriggerRule::OneSuccess),
            ],
            vec![Edge::new("A", "J"), Edge::new("B", "J")],
        );
        let mut s = Scheduler::new(dag, RunParams::new(), 1, false);
        let now = Instant::now();
        s.start(now).unwrap();
        s.handle_completion("A", 1, fail(1), now).unwrap();
        assert_eq!(s.state_of("J"), Some(TaskState::Pending));

        let step = s.handle_completion("B", 1, fail(1), now).unwrap();
        assert_eq!(s.state_of("J"), Some(TaskState::Skipped));
        assert_eq!(step.run_finished, Some(RunPhase::Failed));
    }
}
