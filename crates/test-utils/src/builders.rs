#![allow(dead_code)]

use std::sync::Arc;

use branchdag::config::{BranchConfig, ConfigFile, RawConfigFile, TaskConfig};
use branchdag::dag::{Dag, DagDefinition, DagMeta, Edge, TaskDef};
use branchdag::errors::Result;
use branchdag::types::{TaskKindName, TriggerRule};

/// Builder for a programmatic [`Dag`].
pub struct DagBuilder {
    def: DagDefinition,
}

impl DagBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            def: DagDefinition {
                meta: DagMeta {
                    name: name.to_string(),
                    ..DagMeta::default()
                },
                tasks: Vec::new(),
                edges: Vec::new(),
            },
        }
    }

    pub fn task(mut self, task: TaskDef) -> Self {
        self.def.tasks.push(task);
        self
    }

    pub fn noop(self, id: &str) -> Self {
        self.task(TaskDef::noop(id))
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.def.edges.push(Edge::new(from, to));
        self
    }

    /// `a -> b -> c ...`
    pub fn chain(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.def.edges.push(Edge::new(pair[0], pair[1]));
        }
        self
    }

    pub fn try_build(self) -> Result<Dag> {
        Dag::new(self.def)
    }

    pub fn build(self) -> Arc<Dag> {
        Arc::new(self.try_build().expect("Failed to build valid DAG from builder"))
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.config.dag.name = Some(name.to_string());
        self
    }

    pub fn with_task(mut self, id: &str, task: TaskConfig) -> Self {
        self.config.task.insert(id.to_string(), task);
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.config
            .params
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        self
    }

    pub fn fail_fast(mut self, val: bool) -> Self {
        self.config.config.fail_fast = val;
        self
    }

    pub fn notify_all(mut self) -> Self {
        self.config.config.notify.on_failure = true;
        self.config.config.notify.on_success = true;
        self.config.config.notify.on_retry = true;
        self
    }

    pub fn with_default_retries(mut self, retries: u32, delay: &str) -> Self {
        self.config.default.retries = Some(retries);
        self.config.default.retry_delay = Some(delay.to_string());
        self
    }

    pub fn with_default_sla(mut self, sla: &str) -> Self {
        self.config.default.sla = Some(sla.to_string());
        self
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn cmd(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    pub fn noop() -> Self {
        Self {
            task: TaskConfig {
                kind: Some(TaskKindName::Noop),
                ..TaskConfig::default()
            },
        }
    }

    /// Branch on `param`; `cases` maps values to successors.
    pub fn branch(param: &str, cases: &[(&str, &str)], default: Option<&str>) -> Self {
        Self {
            task: TaskConfig {
                branch: Some(BranchConfig {
                    param: param.to_string(),
                    cases: cases
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    default: default.map(str::to_string),
                }),
                ..TaskConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn trigger_rule(mut self, rule: TriggerRule) -> Self {
        self.task.trigger_rule = Some(rule);
        self
    }

    pub fn retries(mut self, retries: u32, delay: &str) -> Self {
        self.task.retries = Some(retries);
        self.task.retry_delay = Some(delay.to_string());
        self
    }

    pub fn sla(mut self, sla: &str) -> Self {
        self.task.sla = Some(sla.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
