use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use branchdag::dag::{ScheduledTask, TaskKind};
use branchdag::engine::{ActionFailure, NotificationSink, RunEvent, RuntimeEvent, TaskOutcome};
use branchdag::errors::Result;
use branchdag::exec::{CommandOutput, CommandRunner, ExecutorBackend};
use branchdag::types::TaskId;

/// What the fake executor has seen, shared with the test after the executor
/// is moved into the runtime.
#[derive(Debug, Clone, Default)]
pub struct FakeExecutorHandle {
    executed: Arc<Mutex<Vec<String>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
}

impl FakeExecutorHandle {
    /// Task ids in dispatch order, one entry per attempt.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn attempts_of(&self, task: &str) -> usize {
        self.executed().iter().filter(|t| *t == task).count()
    }
}

/// A fake executor that:
/// - records which tasks were "run"
/// - reports a `TaskCompleted` for each scheduled attempt, either right away
///   or after a configured delay
///
/// Outcomes default to `Success`; branch tasks call their real decider.
/// Scripted outcomes are consumed one per attempt.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    handle: FakeExecutorHandle,
    scripted: HashMap<TaskId, VecDeque<TaskOutcome>>,
    delays: HashMap<TaskId, Duration>,
    hanging: HashSet<TaskId>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            handle: FakeExecutorHandle::default(),
            scripted: HashMap::new(),
            delays: HashMap::new(),
            hanging: HashSet::new(),
        }
    }

    pub fn handle(&self) -> FakeExecutorHandle {
        self.handle.clone()
    }

    /// Queue outcomes for successive attempts of `task`.
    pub fn script(mut self, task: &str, outcomes: Vec<TaskOutcome>) -> Self {
        self.scripted
            .entry(task.to_string())
            .or_default()
            .extend(outcomes);
        self
    }

    /// The first `times` attempts of `task` fail with exit code 1.
    pub fn fail_times(self, task: &str, times: usize) -> Self {
        let failures = (0..times)
            .map(|_| TaskOutcome::Failed(ActionFailure::exit(1, format!("{task} failed"))))
            .collect();
        self.script(task, failures)
    }

    /// Report `task`'s result only after `delay`.
    pub fn delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    /// `task` never completes on its own.
    pub fn hang(mut self, task: &str) -> Self {
        self.hanging.insert(task.to_string());
        self
    }

    fn outcome_for(&mut self, task: &ScheduledTask) -> TaskOutcome {
        if let Some(outcome) = self.scripted.get_mut(&task.id).and_then(|q| q.pop_front()) {
            return outcome;
        }
        match &task.kind {
            TaskKind::BranchDecision { decider } => match decider.decide(&task.params) {
                Ok(chosen) => TaskOutcome::Branched(chosen),
                Err(err) => TaskOutcome::Failed(ActionFailure::new(err.to_string())),
            },
            TaskKind::Command { .. } | TaskKind::NoOp => TaskOutcome::Success,
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let mut immediate = Vec::new();

        for t in tasks {
            self.handle.executed.lock().unwrap().push(t.id.clone());

            if self.hanging.contains(&t.id) {
                continue;
            }

            let event = RuntimeEvent::TaskCompleted {
                task: t.id.clone(),
                attempt: t.attempt,
                outcome: self.outcome_for(&t),
            };

            match self.delays.get(&t.id) {
                Some(delay) => {
                    let tx = self.runtime_tx.clone();
                    let delay = *delay;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(event).await;
                    });
                }
                None => immediate.push(event),
            }
        }

        // The runtime cannot drain its channel while awaiting this call.
        if !immediate.is_empty() {
            let tx = self.runtime_tx.clone();
            tokio::spawn(async move {
                for event in immediate {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
        }

        Box::pin(async { Ok(()) })
    }

    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.handle.cancelled.lock().unwrap().extend(tasks);
        Box::pin(async { Ok(()) })
    }
}

/// A `CommandRunner` that returns canned outputs per command string,
/// one per invocation, and exit code 0 once they run out.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outputs: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit_codes(self, cmd: &str, codes: &[i32]) -> Self {
        {
            let mut outputs = self.outputs.lock().unwrap();
            let queue = outputs.entry(cmd.to_string()).or_default();
            for code in codes {
                queue.push_back(CommandOutput {
                    exit_code: Some(*code),
                    stdout: String::new(),
                    stderr: format!("{cmd} exited with {code}"),
                });
            }
        }
        self
    }

    /// Commands in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        _task: &'a str,
        cmd: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutput>> + Send + 'a>> {
        self.calls.lock().unwrap().push(cmd.to_string());
        let output = self
            .outputs
            .lock()
            .unwrap()
            .get_mut(cmd)
            .and_then(|q| q.pop_front())
            .unwrap_or(CommandOutput {
                exit_code: Some(0),
                ..CommandOutput::default()
            });
        Box::pin(async move { Ok(output) })
    }
}

/// Notification sink that keeps every event for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&RunEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &RunEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
