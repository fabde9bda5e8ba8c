// src/dag/trigger.rs

//! Trigger evaluation: may a task run, given the states of its predecessors?
//!
//! Evaluation is a pure function of the trigger rule and the predecessor
//! states, so re-evaluating a task that has not been dispatched yet always
//! yields the same answer.

use crate::dag::task_info::TaskState;
use crate::types::TriggerRule;

/// Classification of a `Pending` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// May be dispatched now.
    Eligible,
    /// Some predecessor has not settled yet.
    WaitingOnPredecessors,
    /// Can never run; settle as `Skipped`.
    Skip,
    /// A required predecessor failed; settle as `UpstreamFailed`.
    UpstreamFailed,
}

impl Readiness {
    /// Terminal state this classification settles the task into, if any.
    pub fn settled_state(self) -> Option<TaskState> {
        match self {
            Readiness::Skip => Some(TaskState::Skipped),
            Readiness::UpstreamFailed => Some(TaskState::UpstreamFailed),
            Readiness::Eligible | Readiness::WaitingOnPredecessors => None,
        }
    }
}

/// Classify a task from its rule and the states of its direct predecessors.
pub fn evaluate(rule: TriggerRule, predecessors: &[TaskState]) -> Readiness {
    if predecessors.is_empty() {
        return Readiness::Eligible;
    }

    match rule {
        TriggerRule::AllSuccess => evaluate_all_success(predecessors),
        TriggerRule::OneSuccess => evaluate_one_success(predecessors),
    }
}

fn evaluate_all_success(predecessors: &[TaskState]) -> Readiness {
    if predecessors.iter().all(|s| *s == TaskState::Success) {
        return Readiness::Eligible;
    }

    if predecessors.iter().any(|s| s.is_failure()) {
        return Readiness::UpstreamFailed;
    }

    if predecessors.contains(&TaskState::Skipped) {
        // Cannot succeed any more; wait for the rest so "every path skipped"
        // and "partly skipped" settle the same way regardless of order.
        if !predecessors.iter().all(|s| s.is_terminal()) {
            return Readiness::WaitingOnPredecessors;
        }
        if predecessors.iter().all(|s| *s == TaskState::Skipped) {
            return Readiness::Skip;
        }
        return Readiness::UpstreamFailed;
    }

    Readiness::WaitingOnPredecessors
}

fn evaluate_one_success(predecessors: &[TaskState]) -> Readiness {
    if predecessors.contains(&TaskState::Success) {
        return Readiness::Eligible;
    }

    if predecessors.iter().all(|s| s.is_terminal()) {
        return Readiness::Skip;
    }

    Readiness::WaitingOnPredecessors
}
