// src/dag/branch.rs

//! Branch resolution: commit a branching task's choice and skip the rest.

use tracing::{debug, info};

use crate::dag::definition::Dag;
use crate::dag::state_manager::{RunState, StateManager};
use crate::dag::task_info::TaskState;
use crate::errors::{DagError, Result};
use crate::types::TaskId;

/// Outcome of resolving a branch decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchResolution {
    pub chosen: TaskId,
    /// Every task settled by the decision: the siblings skipped directly
    /// and the downstream closure reached from them.
    pub settled: Vec<(TaskId, TaskState)>,
}

/// Apply the successor chosen by branching task `task`.
///
/// On success the branch task is marked `Success`, every other successor is
/// marked `Skipped` and skips are propagated to a fixed point. If `chosen`
/// is not a successor of `task`, nothing is changed and a
/// [`DagError::BranchResolution`] is returned; the caller fails the task.
pub fn resolve_branch(
    dag: &Dag,
    state: &mut RunState,
    task: &str,
    chosen: &str,
) -> Result<BranchResolution> {
    let successors = dag.graph().successors_of(task);

    if !successors.iter().any(|s| s == chosen) {
        return Err(DagError::BranchResolution {
            task: task.to_string(),
            chosen: chosen.to_string(),
        });
    }

    if let Some(record) = state.record_mut(dag, task) {
        record.state = TaskState::Success;
        record.chosen_branch = Some(chosen.to_string());
    }

    let mut manager = StateManager::new(dag, state);
    let mut skipped: Vec<TaskId> = Vec::new();

    for succ in successors.iter().filter(|s| s.as_str() != chosen) {
        if manager.skip(succ) {
            skipped.push(succ.clone());
        } else {
            debug!(
                task = %task,
                successor = %succ,
                "branch sibling already past Pending; leaving it alone"
            );
        }
    }

    let mut settled: Vec<(TaskId, TaskState)> = skipped
        .iter()
        .map(|s| (s.clone(), TaskState::Skipped))
        .collect();
    settled.extend(manager.settle_downstream(&skipped));

    info!(
        task = %task,
        chosen = %chosen,
        skipped = settled.len(),
        "branch resolved"
    );

    Ok(BranchResolution {
        chosen: chosen.to_string(),
        settled,
    })
}
