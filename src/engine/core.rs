// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - running retry and SLA timers
//! - handling Ctrl+C / shutdown
//!
//! Time is passed in explicitly, so the core can be unit tested without any
//! Tokio, channels, filesystem, or processes.

use std::time::Instant;

use crate::dag::{RunReport, Scheduler};
use crate::engine::event_handlers::{
    CoreStep, handle_retry_due, handle_run_start, handle_shutdown, handle_sla_deadline,
    handle_task_completion,
};
use crate::engine::{RunOptions, RuntimeEvent};
use crate::errors::Result;

/// Pure core runtime state.
///
/// This owns:
/// - the per-run DAG scheduler
/// - run options (fail-fast, notification policy)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    options: RunOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, options: RunOptions) -> Self {
        Self { scheduler, options }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn report(&self) -> RunReport {
        self.scheduler.report()
    }

    /// Start the run and return the commands that dispatch the roots.
    pub fn start(&mut self, now: Instant) -> Result<CoreStep> {
        handle_run_start(&mut self.scheduler, &self.options, now)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    ///
    /// An error means the run cannot make progress (deadlock).
    pub fn step(&mut self, event: RuntimeEvent, now: Instant) -> Result<CoreStep> {
        match event {
            RuntimeEvent::TaskCompleted {
                task,
                attempt,
                outcome,
            } => handle_task_completion(
                &mut self.scheduler,
                &self.options,
                task,
                attempt,
                outcome,
                now,
            ),
            RuntimeEvent::RetryDue { task } => {
                handle_retry_due(&mut self.scheduler, &self.options, task, now)
            }
            RuntimeEvent::SlaDeadline { task } => Ok(handle_sla_deadline(
                &mut self.scheduler,
                &self.options,
                task,
                now,
            )),
            RuntimeEvent::ShutdownRequested => {
                Ok(handle_shutdown(&mut self.scheduler, &self.options, now))
            }
        }
    }
}
