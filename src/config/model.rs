// src/config/model.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::dag::Dag;
use crate::engine::RunOptions;
use crate::types::{RunParams, TaskKindName, TriggerRule};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [dag]
/// name = "test_branching"
///
/// [config]
/// fail_fast = false
///
/// [default]
/// retries = 2
/// retry_delay = "10s"
///
/// [params]
/// destType = "False"
///
/// [task.A]
/// cmd = "echo A"
///
/// [task.B]
/// after = ["A"]
/// branch = { param = "destType", cases = { "True" = "C" }, default = "D" }
/// ```
///
/// All sections except `[task.*]` are optional and have reasonable defaults.
/// Use [`ConfigFile::try_from`] to validate it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Descriptive metadata from `[dag]`.
    #[serde(default)]
    pub dag: DagSection,

    /// Run behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Per-task defaults from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// Default run parameters from `[params]`.
    ///
    /// Values may be any TOML scalar; they are stringified.
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,

    /// All tasks from `[task.<id>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[dag]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DagSection {
    /// Defaults to the config file's stem when omitted.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Halt the whole run on the first task that fails for good.
    #[serde(default)]
    pub fail_fast: bool,

    /// Which events reach the notification sink.
    #[serde(default)]
    pub notify: NotifySection,
}

/// `[config.notify]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifySection {
    #[serde(default = "default_true")]
    pub on_failure: bool,
    #[serde(default)]
    pub on_success: bool,
    #[serde(default = "default_true")]
    pub on_retry: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            on_failure: true,
            on_success: false,
            on_retry: true,
        }
    }
}

/// `[default]` section: values for tasks that do not set their own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultSection {
    #[serde(default)]
    pub retries: Option<u32>,
    /// Duration string like `"10m"`.
    #[serde(default)]
    pub retry_delay: Option<String>,
    #[serde(default)]
    pub sla: Option<String>,
    #[serde(default)]
    pub trigger_rule: Option<TriggerRule>,
}

/// `[task.<id>]` section.
///
/// The task kind is inferred: a `branch` table makes a branch task, `cmd`
/// makes a command task, neither makes a no-op. `kind` may state it
/// explicitly; it must then agree with the other fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default)]
    pub kind: Option<TaskKindName>,

    /// Shell command to execute.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Declarative branch decision.
    #[serde(default)]
    pub branch: Option<BranchConfig>,

    /// Dependency list: this task is downstream of every task listed here.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub trigger_rule: Option<TriggerRule>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(default)]
    pub sla: Option<String>,
}

/// `branch = { param = "...", cases = { ... }, default = "..." }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BranchConfig {
    /// Run parameter to switch on.
    pub param: String,
    /// Parameter value -> successor id.
    #[serde(default)]
    pub cases: BTreeMap<String, String>,
    /// Successor chosen when no case matches.
    #[serde(default)]
    pub default: Option<String>,
}

/// Validated configuration: the DAG plus how to run it.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub dag: Arc<Dag>,
    pub options: RunOptions,
    /// Default run parameters; callers may override entries before a run.
    pub params: RunParams,
}

impl ConfigFile {
    /// Apply `key=value` overrides on top of the configured parameters.
    pub fn with_params<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in overrides {
            self.params.insert(k.into(), v.into());
        }
        self
    }
}
