// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dag::{RunReport, ScheduledTask};
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::types::TaskId;

use super::core::CoreRuntime;
use super::notify::{NotificationSink, TracingSink};
use super::{CoreCommand, RuntimeEvent};

/// Drives one DAG run in response to `RuntimeEvent`s, and delegates actual
/// task execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. This struct handles async IO: reading events from
/// the channel, dispatching tasks, running retry/SLA timers and delivering
/// notifications.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Used by timers to post events back into the loop.
    event_tx: mpsc::Sender<RuntimeEvent>,
    executor: E,
    sink: Arc<dyn NotificationSink>,
    timers: Vec<JoinHandle<()>>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("timers", &self.timers.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    /// `event_tx` must feed `event_rx`; the executor should hold another
    /// clone of it to report completions.
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            executor,
            sink: Arc::new(TracingSink),
            timers: Vec::new(),
        }
    }

    /// Deliver notifications to `sink` instead of only logging them.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the DAG to completion.
    ///
    /// - Starts the run and dispatches the roots.
    /// - Consumes `RuntimeEvent`s from `event_rx`, one scheduling pass each.
    /// - Executes commands returned by the core (spawn, cancel, timers,
    ///   notifications).
    ///
    /// Returns the final report; a run that ends `Failed` is still `Ok`.
    /// Errors are reserved for runs that cannot make progress.
    pub async fn run(mut self) -> Result<RunReport> {
        info!(
            run_id = self.core.scheduler().run_id(),
            dag = %self.core.scheduler().dag().name(),
            "branchdag runtime started"
        );

        let result = self.drive().await;
        self.abort_timers();

        match result {
            Ok(()) => {
                let report = self.core.report();
                info!(run_id = report.run_id, phase = %report.phase, "runtime exiting");
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, "runtime stopped with error");
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        let step = self.core.start(Instant::now())?;
        for command in step.commands {
            self.execute_command(command).await?;
        }
        if !step.keep_running {
            return Ok(());
        }

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            // Feed the event into the pure core and get commands back.
            let step = self.core.step(event, Instant::now())?;

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        Ok(())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::CancelTasks(tasks) => {
                debug!(?tasks, "cancelling tasks");
                self.executor.cancel_tasks(tasks).await?;
            }
            CoreCommand::ScheduleRetry { task, delay } => {
                self.post_after(delay, RuntimeEvent::RetryDue { task });
            }
            CoreCommand::ArmSlaTimer { task, after } => {
                self.post_after(after, RuntimeEvent::SlaDeadline { task });
            }
            CoreCommand::Notify(events) => {
                for event in events.iter() {
                    self.sink.notify(event);
                }
            }
            CoreCommand::RequestExit => {
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<&TaskId> = tasks.iter().map(|t| &t.id).collect();
        debug!(?ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    /// Post `event` back into the loop once `delay` has elapsed. The loop
    /// itself never sleeps.
    fn post_after(&mut self, delay: Duration, event: RuntimeEvent) {
        self.timers.retain(|h| !h.is_finished());

        let tx = self.event_tx.clone();
        self.timers.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event).await;
        }));
    }

    fn abort_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}
