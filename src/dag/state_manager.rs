// src/dag/state_manager.rs

//! Per-run state store and the state transitions that span several tasks.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::debug;

use crate::dag::definition::Dag;
use crate::dag::task_info::TaskState;
use crate::dag::trigger::{evaluate, Readiness};
use crate::types::TaskId;

/// Mutable per-run record of one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub state: TaskState,
    /// Retries performed so far (failed attempts that were re-dispatched).
    pub retry_count: u32,
    /// Dispatches so far, including the first.
    pub attempts: u32,
    /// First dispatch; the SLA is measured from here.
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    /// Waiting out `retry_delay` before the next attempt.
    pub awaiting_retry: bool,
    pub sla_breached: bool,
    pub chosen_branch: Option<TaskId>,
    pub last_error: Option<String>,
}

impl TaskRecord {
    fn new() -> Self {
        Self {
            state: TaskState::Pending,
            retry_count: 0,
            attempts: 0,
            started_at: None,
            finished_at: None,
            awaiting_retry: false,
            sla_breached: false,
            chosen_branch: None,
            last_error: None,
        }
    }
}

/// Execution state store for a single run.
///
/// Indexed like the DAG's task table; owned exclusively by one
/// [`Scheduler`](crate::dag::Scheduler).
#[derive(Debug, Clone)]
pub struct RunState {
    records: Vec<TaskRecord>,
}

impl RunState {
    pub fn new(dag: &Dag) -> Self {
        Self {
            records: (0..dag.graph().len()).map(|_| TaskRecord::new()).collect(),
        }
    }

    pub fn record(&self, dag: &Dag, id: &str) -> Option<&TaskRecord> {
        dag.graph().index_of(id).map(|i| &self.records[i])
    }

    pub fn record_mut(&mut self, dag: &Dag, id: &str) -> Option<&mut TaskRecord> {
        let i = dag.graph().index_of(id)?;
        Some(&mut self.records[i])
    }

    pub fn state_of(&self, dag: &Dag, id: &str) -> Option<TaskState> {
        self.record(dag, id).map(|r| r.state)
    }

    pub fn retry_count(&self, dag: &Dag, id: &str) -> Option<u32> {
        self.record(dag, id).map(|r| r.retry_count)
    }

    /// States of the direct predecessors of `id`.
    pub fn predecessor_states(&self, dag: &Dag, id: &str) -> Vec<TaskState> {
        dag.graph()
            .predecessors_of(id)
            .iter()
            .filter_map(|p| self.state_of(dag, p))
            .collect()
    }

    /// Classify a task with the trigger evaluator using current predecessor
    /// states. Returns `None` for unknown tasks.
    pub fn readiness_of(&self, dag: &Dag, id: &str) -> Option<Readiness> {
        let def = dag.task(id)?;
        let preds = self.predecessor_states(dag, id);
        Some(evaluate(def.trigger_rule, &preds))
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    pub fn all_terminal(&self) -> bool {
        self.records.iter().all(|r| r.state.is_terminal())
    }
}

/// Applies multi-task transitions to a [`RunState`].
pub struct StateManager<'a> {
    dag: &'a Dag,
    state: &'a mut RunState,
}

impl<'a> StateManager<'a> {
    pub fn new(dag: &'a Dag, state: &'a mut RunState) -> Self {
        Self { dag, state }
    }

    pub fn readiness_of(&self, id: &str) -> Option<Readiness> {
        self.state.readiness_of(self.dag, id)
    }

    /// Propagate terminal non-success states downstream until a fixed point.
    ///
    /// `seeds` are tasks whose state just became terminal. Every `Pending`
    /// successor is re-classified; those that can no longer run settle as
    /// `Skipped` / `UpstreamFailed` and are pushed onto the worklist in turn.
    /// Propagation stops at tasks whose rule can still be satisfied (e.g. a
    /// `OneSuccess` join with a live path).
    ///
    /// Returns the tasks settled by this call, in settlement order.
    pub fn settle_downstream(&mut self, seeds: &[TaskId]) -> Vec<(TaskId, TaskState)> {
        let dag = self.dag;
        let mut worklist: VecDeque<TaskId> = seeds.iter().cloned().collect();
        let mut settled = Vec::new();

        while let Some(name) = worklist.pop_front() {
            for succ in dag.graph().successors_of(&name) {
                if self.state.state_of(dag, succ) != Some(TaskState::Pending) {
                    continue;
                }

                let Some(new_state) = self.readiness_of(succ).and_then(|r| r.settled_state())
                else {
                    continue;
                };

                if let Some(record) = self.state.record_mut(dag, succ) {
                    record.state = new_state;
                }
                debug!(task = %succ, from = %name, state = %new_state, "settled downstream task");
                settled.push((succ.clone(), new_state));
                worklist.push_back(succ.clone());
            }
        }

        settled
    }

    /// Mark a `Pending` task as `Skipped` directly (branch not taken).
    ///
    /// Returns `false` if the task was not pending.
    pub fn skip(&mut self, id: &str) -> bool {
        match self.state.record_mut(self.dag, id) {
            Some(record) if record.state == TaskState::Pending => {
                record.state = TaskState::Skipped;
                true
            }
            _ => false,
        }
    }

    /// Pending tasks that the trigger evaluator classifies as eligible, in
    /// topological order. Does not change any state.
    pub fn eligible_tasks(&self) -> Vec<TaskId> {
        self.dag
            .graph()
            .topo_order()
            .filter(|id| self.state.state_of(self.dag, id) == Some(TaskState::Pending))
            .filter(|id| self.readiness_of(id) == Some(Readiness::Eligible))
            .map(str::to_string)
            .collect()
    }

    /// Settle any pending task whose predecessors already rule it out.
    ///
    /// Normally `settle_downstream` catches these as they happen; this is the
    /// full sweep used when a run starts or is halted.
    pub fn settle_all_pending(&mut self) -> Vec<(TaskId, TaskState)> {
        let mut settled = Vec::new();
        let order: Vec<TaskId> = self.dag.graph().topo_order().map(str::to_string).collect();

        for id in order {
            if self.state.state_of(self.dag, &id) != Some(TaskState::Pending) {
                continue;
            }
            if let Some(new_state) = self.readiness_of(&id).and_then(|r| r.settled_state()) {
                if let Some(record) = self.state.record_mut(self.dag, &id) {
                    record.state = new_state;
                }
                settled.push((id, new_state));
            }
        }

        settled
    }
}
