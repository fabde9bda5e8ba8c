// src/config/validate.rs

//! Semantic validation: turn a [`RawConfigFile`] into a runnable
//! [`ConfigFile`].
//!
//! Structural DAG checks (unknown dependencies, cycles, branch targets) are
//! delegated to [`Dag::new`], so programmatic and TOML definitions are held
//! to the same rules.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::duration::parse_duration;
use crate::config::model::{
    BranchConfig, ConfigFile, DefaultSection, RawConfigFile, TaskConfig,
};
use crate::dag::{Dag, DagDefinition, DagMeta, Edge, ParamSwitch, TaskDef, TaskKind};
use crate::engine::notify::NotifyPolicy;
use crate::engine::RunOptions;
use crate::errors::{DagError, Result};
use crate::types::{RunParams, TaskKindName};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(raw, None)
    }
}

/// Validate a raw config. `fallback_name` names the DAG when `[dag].name`
/// is absent (the loader passes the file stem).
pub fn validate_config(raw: RawConfigFile, fallback_name: Option<&str>) -> Result<ConfigFile> {
    ensure_has_tasks(&raw)?;

    let meta = DagMeta {
        name: raw
            .dag
            .name
            .clone()
            .or_else(|| fallback_name.map(str::to_string))
            .unwrap_or_else(|| "dag".to_string()),
        description: raw.dag.description.clone(),
        owner: raw.dag.owner.clone(),
        tags: raw.dag.tags.clone(),
    };

    let defaults = ResolvedDefaults::from_section(&raw.default)?;

    let mut tasks = Vec::with_capacity(raw.task.len());
    let mut edges = Vec::new();

    for (id, task) in raw.task.iter() {
        tasks.push(build_task(id, task, &defaults)?);
        for dep in task.after.iter() {
            if !raw.task.contains_key(dep) {
                return Err(DagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    id, dep
                )));
            }
            edges.push(Edge::new(dep.clone(), id.clone()));
        }
    }

    let dag = Dag::new(DagDefinition { meta, tasks, edges })?;

    let notify = &raw.config.notify;
    let options = RunOptions {
        fail_fast: raw.config.fail_fast,
        notify: NotifyPolicy {
            on_failure: notify.on_failure,
            on_success: notify.on_success,
            on_retry: notify.on_retry,
        },
    };

    let params: RunParams = raw
        .params
        .into_iter()
        .map(|(k, v)| (k, param_to_string(v)))
        .collect();

    debug!(dag = %dag.name(), tasks = dag.graph().len(), "config validated");

    Ok(ConfigFile {
        dag: Arc::new(dag),
        options,
        params,
    })
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DagError::ConfigError(
            "config must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

/// `[default]` with durations parsed.
struct ResolvedDefaults {
    retries: u32,
    retry_delay: Duration,
    sla: Option<Duration>,
    trigger_rule: crate::types::TriggerRule,
}

impl ResolvedDefaults {
    fn from_section(section: &DefaultSection) -> Result<Self> {
        Ok(Self {
            retries: section.retries.unwrap_or(0),
            retry_delay: section
                .retry_delay
                .as_deref()
                .map(|s| duration_field("[default].retry_delay", s))
                .transpose()?
                .unwrap_or(Duration::ZERO),
            sla: section
                .sla
                .as_deref()
                .map(|s| duration_field("[default].sla", s))
                .transpose()?,
            trigger_rule: section.trigger_rule.unwrap_or_default(),
        })
    }
}

fn build_task(id: &str, cfg: &TaskConfig, defaults: &ResolvedDefaults) -> Result<TaskDef> {
    let kind = task_kind(id, cfg)?;

    let retry_delay = match cfg.retry_delay.as_deref() {
        Some(s) => duration_field(&format!("[task.{id}].retry_delay"), s)?,
        None => defaults.retry_delay,
    };
    let sla = match cfg.sla.as_deref() {
        Some(s) => Some(duration_field(&format!("[task.{id}].sla"), s)?),
        None => defaults.sla,
    };

    let mut def = TaskDef::new(id, kind)
        .with_trigger_rule(cfg.trigger_rule.unwrap_or(defaults.trigger_rule))
        .with_retries(cfg.retries.unwrap_or(defaults.retries), retry_delay);
    if let Some(sla) = sla {
        def = def.with_sla(sla);
    }
    Ok(def)
}

/// Infer the task kind and reject contradictory combinations.
fn task_kind(id: &str, cfg: &TaskConfig) -> Result<TaskKind> {
    let conflict = |what: &str| {
        DagError::ConfigError(format!("task '{id}': {what}"))
    };

    match (cfg.kind, cfg.cmd.as_ref(), cfg.branch.as_ref()) {
        (_, Some(_), Some(_)) => Err(conflict("`cmd` and `branch` are mutually exclusive")),

        (None | Some(TaskKindName::Branch), None, Some(branch)) => Ok(branch_kind(id, branch)?),
        (Some(TaskKindName::Branch), None, None) => {
            Err(conflict("kind = \"branch\" requires a `branch` table"))
        }

        (None | Some(TaskKindName::Command), Some(cmd), None) => {
            if cmd.trim().is_empty() {
                return Err(conflict("`cmd` must not be empty"));
            }
            Ok(TaskKind::Command { cmd: cmd.clone() })
        }
        (Some(TaskKindName::Command), None, None) => {
            Err(conflict("kind = \"command\" requires `cmd`"))
        }

        (None | Some(TaskKindName::Noop), None, None) => Ok(TaskKind::NoOp),

        (Some(kind), _, _) => Err(conflict(&format!(
            "kind = \"{}\" conflicts with the other fields",
            kind_name(kind)
        ))),
    }
}

fn branch_kind(id: &str, branch: &BranchConfig) -> Result<TaskKind> {
    if branch.param.trim().is_empty() {
        return Err(DagError::ConfigError(format!(
            "task '{id}': branch.param must not be empty"
        )));
    }
    if branch.cases.is_empty() && branch.default.is_none() {
        return Err(DagError::ConfigError(format!(
            "task '{id}': branch needs at least one case or a default"
        )));
    }

    let switch = ParamSwitch {
        param: branch.param.clone(),
        cases: branch.cases.clone(),
        default: branch.default.clone(),
    };
    Ok(TaskKind::BranchDecision {
        decider: Arc::new(switch),
    })
}

fn kind_name(kind: TaskKindName) -> &'static str {
    match kind {
        TaskKindName::Command => "command",
        TaskKindName::Branch => "branch",
        TaskKindName::Noop => "noop",
    }
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| DagError::ConfigError(format!("{field}: {e}")))
}

fn param_to_string(value: toml::Value) -> String {
    match value {
        toml::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TriggerRule;

    fn parse(src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn defaults_apply_unless_overridden() {
        let cfg = parse(
            r#"
            [default]
            retries = 3
            retry_delay = "10m"
            sla = "1h"

            [task.a]
            cmd = "true"

            [task.b]
            cmd = "true"
            after = ["a"]
            retries = 0
            sla = "5s"
            trigger_rule = "one_success"
            "#,
        )
        .unwrap();

        let a = cfg.dag.task("a").unwrap();
        assert_eq!(a.retry_limit, 3);
        assert_eq!(a.retry_delay, Duration::from_secs(600));
        assert_eq!(a.sla, Some(Duration::from_secs(3600)));
        assert_eq!(a.trigger_rule, TriggerRule::AllSuccess);

        let b = cfg.dag.task("b").unwrap();
        assert_eq!(b.retry_limit, 0);
        assert_eq!(b.sla, Some(Duration::from_secs(5)));
        assert_eq!(b.trigger_rule, TriggerRule::OneSuccess);
        assert_eq!(cfg.dag.graph().predecessors_of("b"), &["a".to_string()]);
    }

    #[test]
    fn kinds_are_inferred() {
        let cfg = parse(
            r#"
            [params]
            flag = true

            [task.pick]
            branch = { param = "flag", cases = { "true" = "yes" }, default = "no" }

            [task.yes]
            after = ["pick"]

            [task.no]
            kind = "noop"
            after = ["pick"]
            "#,
        )
        .unwrap();

        assert!(cfg.dag.task("pick").unwrap().kind.is_branch());
        assert!(matches!(cfg.dag.task("yes").unwrap().kind, TaskKind::NoOp));
        assert_eq!(cfg.params.get("flag").map(String::as_str), Some("true"));
    }

    #[test]
    fn cmd_and_branch_conflict() {
        let err = parse(
            r#"
            [task.x]
            cmd = "true"
            branch = { param = "p", default = "y" }

            [task.y]
            after = ["x"]
            "#,
        )
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn noop_with_cmd_conflicts() {
        let err = parse(
            r#"
            [task.x]
            kind = "noop"
            cmd = "true"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("conflicts"));
    }

    #[test]
    fn branch_to_non_successor_is_rejected() {
        let err = parse(
            r#"
            [task.pick]
            branch = { param = "p", default = "elsewhere" }

            [task.next]
            after = ["pick"]

            [task.elsewhere]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DagError::ConfigError(_)));
    }

    #[test]
    fn bad_duration_names_the_field() {
        let err = parse(
            r#"
            [task.a]
            cmd = "true"
            sla = "soon"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[task.a].sla"));
    }

    #[test]
    fn with_params_overrides() {
        let cfg = parse(
            r#"
            [params]
            env = "dev"

            [task.a]
            "#,
        )
        .unwrap()
        .with_params([("env", "prod")]);

        assert_eq!(cfg.params["env"], "prod");
    }
}
