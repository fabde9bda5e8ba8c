// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use std::time::Duration;

use crate::dag::report::RunPhase;
use crate::dag::task_info::ScheduledTask;
use crate::engine::notify::RunEvent;
use crate::types::TaskId;

/// Structured result of a single scheduler pass.
///
/// The pure scheduler never performs IO; everything the outside world must
/// do as a consequence of a pass is listed here.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became eligible (or are re-attempted) and must be run now.
    pub dispatched: Vec<ScheduledTask>,
    /// Failed tasks to re-dispatch once the delay has elapsed.
    pub retries: Vec<(TaskId, Duration)>,
    /// SLA deadlines to watch, relative to now.
    pub sla_timers: Vec<(TaskId, Duration)>,
    /// Running tasks whose results will be discarded; ask them to stop.
    pub cancelled: Vec<TaskId>,
    /// Notifications produced by this pass, in order.
    pub events: Vec<RunEvent>,
    /// Set when this pass moved the run into a terminal phase.
    pub run_finished: Option<RunPhase>,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty()
            && self.retries.is_empty()
            && self.sla_timers.is_empty()
            && self.cancelled.is_empty()
            && self.events.is_empty()
            && self.run_finished.is_none()
    }

    /// Ids of the dispatched tasks, in dispatch order.
    pub fn dispatched_ids(&self) -> Vec<TaskId> {
        self.dispatched.iter().map(|t| t.id.clone()).collect()
    }
}
