// src/dag/task_info.rs

//! Task definitions, per-run task states and scheduled task types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::types::{RunParams, TaskId, TriggerRule};

/// Decision logic of a branching task.
///
/// Receives the run parameters and returns the id of exactly one successor
/// to activate. Returning an id that is not a successor fails the branch
/// task.
pub trait BranchDecider: Send + Sync {
    fn decide(&self, params: &RunParams) -> Result<TaskId>;

    /// Successors this decider can possibly return, when known statically.
    ///
    /// Used to reject impossible branch tables at load time.
    fn candidates(&self) -> Option<Vec<TaskId>> {
        None
    }
}

impl<F> BranchDecider for F
where
    F: Fn(&RunParams) -> Result<TaskId> + Send + Sync,
{
    fn decide(&self, params: &RunParams) -> Result<TaskId> {
        self(params)
    }
}

/// Branch decider that switches on a single run parameter.
///
/// ```toml
/// branch = { param = "destType", cases = { "true" = "step3" }, default = "step4" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSwitch {
    pub param: String,
    pub cases: BTreeMap<String, TaskId>,
    pub default: Option<TaskId>,
}

impl BranchDecider for ParamSwitch {
    fn decide(&self, params: &RunParams) -> Result<TaskId> {
        let value = params.get(&self.param);

        if let Some(target) = value.and_then(|v| self.cases.get(v)) {
            return Ok(target.clone());
        }

        self.default.clone().ok_or_else(|| match value {
            Some(v) => anyhow!(
                "no branch case for {}={:?} and no default successor",
                self.param,
                v
            ),
            None => anyhow!(
                "run parameter '{}' is not set and no default successor is configured",
                self.param
            ),
        })
    }

    fn candidates(&self) -> Option<Vec<TaskId>> {
        let mut out: Vec<TaskId> = self.cases.values().cloned().collect();
        out.extend(self.default.iter().cloned());
        out.sort();
        out.dedup();
        Some(out)
    }
}

/// What a task does when dispatched.
#[derive(Clone)]
pub enum TaskKind {
    /// Run a shell command; non-zero exit is a failure.
    Command { cmd: String },
    /// Choose exactly one successor to continue with.
    BranchDecision { decider: Arc<dyn BranchDecider> },
    /// Do nothing and succeed (join points, markers).
    NoOp,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Command { .. } => "command",
            TaskKind::BranchDecision { .. } => "branch",
            TaskKind::NoOp => "noop",
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, TaskKind::BranchDecision { .. })
    }
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Command { cmd } => f.debug_struct("Command").field("cmd", cmd).finish(),
            TaskKind::BranchDecision { decider } => f
                .debug_struct("BranchDecision")
                .field("candidates", &decider.candidates())
                .finish(),
            TaskKind::NoOp => f.write_str("NoOp"),
        }
    }
}

/// Immutable definition of one task in a DAG.
#[derive(Debug, Clone)]
pub struct TaskDef {
    pub id: TaskId,
    pub kind: TaskKind,
    pub trigger_rule: TriggerRule,
    /// Number of re-attempts allowed after the first failure.
    pub retry_limit: u32,
    pub retry_delay: Duration,
    /// Time budget measured from the task's first dispatch.
    pub sla: Option<Duration>,
}

impl TaskDef {
    pub fn new(id: impl Into<TaskId>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            kind,
            trigger_rule: TriggerRule::default(),
            retry_limit: 0,
            retry_delay: Duration::ZERO,
            sla: None,
        }
    }

    pub fn command(id: impl Into<TaskId>, cmd: impl Into<String>) -> Self {
        Self::new(id, TaskKind::Command { cmd: cmd.into() })
    }

    pub fn branch(id: impl Into<TaskId>, decider: impl BranchDecider + 'static) -> Self {
        Self::new(
            id,
            TaskKind::BranchDecision {
                decider: Arc::new(decider),
            },
        )
    }

    pub fn noop(id: impl Into<TaskId>) -> Self {
        Self::new(id, TaskKind::NoOp)
    }

    pub fn with_trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.trigger_rule = rule;
        self
    }

    pub fn with_retries(mut self, limit: u32, delay: Duration) -> Self {
        self.retry_limit = limit;
        self.retry_delay = delay;
        self
    }

    pub fn with_sla(mut self, sla: Duration) -> Self {
        self.sla = Some(sla);
        self
    }
}

/// Directed dependency: `to` runs after `from`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: TaskId,
    pub to: TaskId,
}

impl Edge {
    pub fn new(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Per-run state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting on predecessors.
    Pending,
    /// Dispatched to the executor (also while waiting out a retry delay).
    Running,
    Success,
    /// Failed after exhausting its retries (or cancelled by fail-fast).
    Failed,
    /// Not on the chosen path, or no predecessor it needs can succeed.
    Skipped,
    /// A predecessor it required failed.
    UpstreamFailed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }

    /// Terminal states that make the run fail.
    pub fn is_failure(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::UpstreamFailed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
            TaskState::UpstreamFailed => "upstream_failed",
        };
        f.write_str(s)
    }
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub kind: TaskKind,
    /// 1-based attempt number within this run.
    pub attempt: u32,
    /// All tasks dispatched for the same DAG run share the same `run_id`.
    pub run_id: u64,
    pub params: Arc<RunParams>,
}

impl ScheduledTask {
    pub fn from_task_def(def: &TaskDef, attempt: u32, run_id: u64, params: Arc<RunParams>) -> Self {
        Self {
            id: def.id.clone(),
            kind: def.kind.clone(),
            attempt,
            run_id,
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch() -> ParamSwitch {
        ParamSwitch {
            param: "skipFlag".into(),
            cases: BTreeMap::from([("true".to_string(), "step3".to_string())]),
            default: Some("step4".into()),
        }
    }

    #[test]
    fn param_switch_matches_case() {
        let params = RunParams::from([("skipFlag".to_string(), "true".to_string())]);
        assert_eq!(switch().decide(&params).unwrap(), "step3");
    }

    #[test]
    fn param_switch_falls_back_to_default() {
        let params = RunParams::from([("skipFlag".to_string(), "False".to_string())]);
        assert_eq!(switch().decide(&params).unwrap(), "step4");
        assert_eq!(switch().decide(&RunParams::new()).unwrap(), "step4");
    }

    #[test]
    fn param_switch_without_default_errors() {
        let mut s = switch();
        s.default = None;
        let err = s.decide(&RunParams::new()).unwrap_err();
        assert!(err.to_string().contains("skipFlag"));
    }

    #[test]
    fn closures_are_deciders() {
        let def = TaskDef::branch("pick", |_: &RunParams| Ok::<_, anyhow::Error>("left".to_string()));
        match def.kind {
            TaskKind::BranchDecision { decider } => {
                assert_eq!(decider.decide(&RunParams::new()).unwrap(), "left");
                assert!(decider.candidates().is_none());
            }
            other => panic!("expected branch kind, got {other:?}"),
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Skipped.is_terminal());
        assert!(TaskState::UpstreamFailed.is_failure());
        assert!(!TaskState::Skipped.is_failure());
    }
}
