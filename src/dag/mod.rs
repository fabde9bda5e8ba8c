// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`definition`] validates a DAG definition into an immutable [`Dag`].
//! - [`graph`] is the edge registry: adjacency plus a topological order.
//! - [`trigger`] classifies a pending task from its predecessors' states.
//! - [`state_manager`] holds per-run task records and propagates skips and
//!   upstream failures.
//! - [`branch`] commits a branch decision.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run, and when dependents can be scheduled.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`report`] is the post-run summary.

pub mod branch;
pub mod definition;
pub mod graph;
pub mod report;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;
pub mod trigger;

pub use definition::{Dag, DagDefinition, DagMeta};
pub use graph::DagGraph;
pub use report::{RunPhase, RunReport, TaskReport};
pub use scheduler::{Scheduler, next_run_id};
pub use scheduler_step::SchedulerStep;
pub use task_info::{
    BranchDecider, Edge, ParamSwitch, ScheduledTask, TaskDef, TaskKind, TaskState,
};
pub use trigger::Readiness;
