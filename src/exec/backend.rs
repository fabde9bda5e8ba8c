// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`](super::executor_loop).
//!
//! - `RealExecutorBackend` is the default implementation used by `branchdag`.
//!   It wraps the `spawn_executor` loop and forwards requests over an mpsc
//!   channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::command::{CommandRunner, ShellCommandRunner};
use crate::exec::executor_loop::{spawn_executor, ExecutorRequest};
use crate::types::TaskId;

/// Trait abstracting how scheduled tasks are executed.
///
/// Production code uses [`RealExecutorBackend`]; tests can provide their own
/// implementation that doesn't spawn real processes.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Each attempt must eventually produce exactly one
    /// `RuntimeEvent::TaskCompleted`, unless it is cancelled.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask running tasks to stop. Their results, if any still arrive, are
    /// ignored by the scheduler.
    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
///
/// Internally, this just wraps the executor loop in [`spawn_executor`].
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorRequest>,
}

impl RealExecutorBackend {
    /// Create a backend running commands through the system shell.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self::with_runner(runtime_tx, Arc::new(ShellCommandRunner))
    }

    /// Create a backend with a custom command runner.
    pub fn with_runner(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let tx = spawn_executor(runtime_tx, runner);
        Self { tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                tx.send(ExecutorRequest::Run(task))
                    .await
                    .map_err(|_| anyhow!("executor loop has stopped"))?;
            }
            Ok(())
        })
    }

    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            tx.send(ExecutorRequest::Cancel(tasks))
                .await
                .map_err(|_| anyhow!("executor loop has stopped"))?;
            Ok(())
        })
    }
}
