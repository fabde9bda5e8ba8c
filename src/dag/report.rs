// src/dag/report.rs

//! Run-level phase and the post-run report.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::dag::task_info::TaskState;
use crate::types::TaskId;

/// Lifecycle of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    Running,
    /// Every task ended `Success` or `Skipped`.
    Completed,
    /// At least one task ended `Failed` or `UpstreamFailed`.
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Initializing => "initializing",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Final (or snapshot) outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub state: TaskState,
    pub retry_count: u32,
    pub attempts: u32,
    pub sla_breached: bool,
    pub chosen_branch: Option<TaskId>,
    pub last_error: Option<String>,
    /// From first dispatch to the final result, if the task ran.
    pub duration: Option<Duration>,
}

/// Queryable record of a run, for diagnosis after it ends.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: u64,
    pub dag_name: String,
    pub phase: RunPhase,
    pub tasks: BTreeMap<TaskId, TaskReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.phase == RunPhase::Completed
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|t| t.state)
    }

    pub fn retry_count(&self, task: &str) -> Option<u32> {
        self.tasks.get(task).map(|t| t.retry_count)
    }

    /// Ids of the tasks that ended in `state`, sorted.
    pub fn tasks_in(&self, state: TaskState) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|(_, t)| t.state == state)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
