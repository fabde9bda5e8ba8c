// src/dag/definition.rs

//! Loading a DAG definition (task list + edge list) into a validated [`Dag`].

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::dag::graph::DagGraph;
use crate::dag::task_info::{Edge, TaskDef, TaskKind};
use crate::errors::{DagError, Result};

/// Descriptive metadata carried alongside the DAG; not used for scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DagMeta {
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub tags: Vec<String>,
}

/// Unvalidated input: what a caller (or the TOML loader) hands us.
#[derive(Debug, Clone, Default)]
pub struct DagDefinition {
    pub meta: DagMeta,
    pub tasks: Vec<TaskDef>,
    pub edges: Vec<Edge>,
}

/// A validated, immutable DAG: task definitions plus the edge registry.
///
/// Shared read-only (usually behind an `Arc`) by every run of the same DAG.
#[derive(Debug, Clone)]
pub struct Dag {
    meta: DagMeta,
    /// Indexed like the graph's node table.
    tasks: Vec<TaskDef>,
    graph: DagGraph,
}

fn task_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("static regex"))
}

impl Dag {
    /// Validate a definition.
    ///
    /// Fails with `ConfigError` on empty DAGs, malformed or duplicate task
    /// ids, dangling edges, branch tables naming non-successors, and with
    /// `DagCycle` on cycles.
    pub fn new(def: DagDefinition) -> Result<Self> {
        if def.tasks.is_empty() {
            return Err(DagError::ConfigError(
                "DAG must contain at least one task".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for task in def.tasks.iter() {
            if !task_id_regex().is_match(&task.id) {
                return Err(DagError::ConfigError(format!(
                    "task id '{}' may only contain letters, digits, '_', '.' and '-'",
                    task.id
                )));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(DagError::ConfigError(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }

        let ids: Vec<_> = def.tasks.iter().map(|t| t.id.clone()).collect();
        let graph = DagGraph::build(&ids, &def.edges)?;

        validate_branch_targets(&def.tasks, &graph)?;

        debug!(
            dag = %def.meta.name,
            tasks = def.tasks.len(),
            edges = graph.edges().count(),
            "DAG definition validated"
        );

        Ok(Self {
            meta: def.meta,
            tasks: def.tasks,
            graph,
        })
    }

    pub fn meta(&self) -> &DagMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn task(&self, id: &str) -> Option<&TaskDef> {
        self.graph.index_of(id).map(|i| &self.tasks[i])
    }

    /// Task definitions in topological order.
    pub fn tasks_in_order(&self) -> impl Iterator<Item = &TaskDef> {
        self.graph
            .topo_order()
            .filter_map(move |id| self.task(id))
    }
}

fn validate_branch_targets(tasks: &[TaskDef], graph: &DagGraph) -> Result<()> {
    for task in tasks {
        let TaskKind::BranchDecision { decider } = &task.kind else {
            continue;
        };

        let successors = graph.successors_of(&task.id);
        if successors.is_empty() {
            return Err(DagError::ConfigError(format!(
                "branch task '{}' has no successors to choose from",
                task.id
            )));
        }

        if let Some(candidates) = decider.candidates() {
            for candidate in candidates {
                if !successors.contains(&candidate) {
                    return Err(DagError::ConfigError(format!(
                        "branch task '{}' can choose '{}', which is not one of its successors {:?}",
                        task.id, candidate, successors
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dag::task_info::ParamSwitch;

    fn def(tasks: Vec<TaskDef>, edges: Vec<Edge>) -> DagDefinition {
        DagDefinition {
            meta: DagMeta {
                name: "test".into(),
                ..DagMeta::default()
            },
            tasks,
            edges,
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = Dag::new(def(
            vec![TaskDef::noop("A"), TaskDef::noop("A")],
            vec![],
        ))
        .unwrap_err();

        match err {
            DagError::ConfigError(msg) => assert!(msg.contains("duplicate task id 'A'")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let err = Dag::new(def(vec![TaskDef::noop("has space")], vec![])).unwrap_err();
        assert!(matches!(err, DagError::ConfigError(_)));
    }

    #[test]
    fn empty_dag_is_rejected() {
        assert!(Dag::new(def(vec![], vec![])).is_err());
    }

    #[test]
    fn branch_table_must_name_successors() {
        let switch = ParamSwitch {
            param: "p".into(),
            cases: BTreeMap::from([("x".to_string(), "nowhere".to_string())]),
            default: Some("left".into()),
        };
        let err = Dag::new(def(
            vec![TaskDef::branch("pick", switch), TaskDef::noop("left")],
            vec![Edge::new("pick", "left")],
        ))
        .unwrap_err();

        match err {
            DagError::ConfigError(msg) => assert!(msg.contains("nowhere")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn branch_without_successors_is_rejected() {
        let err = Dag::new(def(
            vec![TaskDef::branch("pick", |_: &crate::types::RunParams| {
                Ok::<_, anyhow::Error>("x".to_string())
            })],
            vec![],
        ))
        .unwrap_err();
        assert!(matches!(err, DagError::ConfigError(_)));
    }

    #[test]
    fn tasks_in_order_follow_topology() {
        let dag = Dag::new(def(
            vec![TaskDef::noop("C"), TaskDef::noop("B"), TaskDef::noop("A")],
            vec![Edge::new("A", "B"), Edge::new("B", "C")],
        ))
        .unwrap();

        let order: Vec<_> = dag.tasks_in_order().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(dag.name(), "test");
    }
}
