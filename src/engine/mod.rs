// src/engine/mod.rs

//! Orchestration engine for branchdag.
//!
//! This module ties together:
//! - the per-run DAG scheduler
//! - the runtime event loop that reacts to:
//!   - task completion events from the executor
//!   - retry and SLA timers
//!   - shutdown signals
//! - notification delivery
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::fmt;

use crate::types::TaskId;

/// Why an action failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    /// Process exit code, when the action was a command that ran to exit.
    pub exit_code: Option<i32>,
    pub message: String,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            message: message.into(),
        }
    }

    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) if self.message.is_empty() => write!(f, "exit code {code}"),
            Some(code) => write!(f, "exit code {code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of one task attempt, as reported by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// A branch decision ran and chose this successor.
    Branched(TaskId),
    Failed(ActionFailure),
}

/// Per-run options; passed explicitly so concurrent runs can differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Halt the run on the first task that fails for good, cancelling
    /// whatever is still running.
    pub fail_fast: bool,
    pub notify: NotifyPolicy,
}

/// Events flowing into the runtime from the executor, timers, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// An attempt of a task finished.
    TaskCompleted {
        task: TaskId,
        attempt: u32,
        outcome: TaskOutcome,
    },
    /// A failed task's retry delay has elapsed.
    RetryDue { task: TaskId },
    /// A task's SLA deadline has elapsed.
    SlaDeadline { task: TaskId },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod notify;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use notify::{ChannelSink, NotificationSink, NotifyPolicy, RunEvent, TracingSink};
pub use runtime::Runtime;
