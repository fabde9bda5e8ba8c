// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use crate::dag::task_info::Edge;
use crate::errors::{DagError, Result};
use crate::types::TaskId;

/// Internal node structure: stores immediate predecessors and successors.
#[derive(Debug, Clone)]
struct DagNode {
    id: TaskId,
    /// Direct predecessors: tasks whose state feeds this task's trigger rule.
    predecessors: Vec<TaskId>,
    /// Direct successors: tasks that depend on this one.
    successors: Vec<TaskId>,
}

/// Edge registry: an index-based table of tasks and their adjacency.
///
/// Purely structural; per-run state lives in
/// [`RunState`](crate::dag::state_manager::RunState). Building the graph
/// rejects dangling edges, self-edges and cycles.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: Vec<DagNode>,
    index: HashMap<TaskId, usize>,
    /// Indices of `nodes` in a valid topological order.
    topo: Vec<usize>,
}

impl DagGraph {
    /// Build the registry from task ids (unique, already checked by the
    /// caller) and an edge list.
    pub fn build(ids: &[TaskId], edges: &[Edge]) -> Result<Self> {
        let mut nodes: Vec<DagNode> = ids
            .iter()
            .map(|id| DagNode {
                id: id.clone(),
                predecessors: Vec::new(),
                successors: Vec::new(),
            })
            .collect();

        let index: HashMap<TaskId, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        for edge in edges {
            let from = *index.get(&edge.from).ok_or_else(|| {
                DagError::ConfigError(format!(
                    "edge {} -> {} references unknown task '{}'",
                    edge.from, edge.to, edge.from
                ))
            })?;
            let to = *index.get(&edge.to).ok_or_else(|| {
                DagError::ConfigError(format!(
                    "edge {} -> {} references unknown task '{}'",
                    edge.from, edge.to, edge.to
                ))
            })?;

            if from == to {
                return Err(DagError::ConfigError(format!(
                    "task '{}' cannot depend on itself",
                    edge.from
                )));
            }

            // Duplicate edges collapse into one.
            if !nodes[from].successors.contains(&edge.to) {
                nodes[from].successors.push(edge.to.clone());
                nodes[to].predecessors.push(edge.from.clone());
            }
        }

        for node in nodes.iter_mut() {
            node.predecessors.sort();
            node.successors.sort();
        }

        let topo = topological_order(&nodes, &index)?;

        Ok(Self { nodes, index, topo })
    }

    /// Return all task ids in definition order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Position of a task in the table.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Immediate predecessors of a task.
    pub fn predecessors_of(&self, id: &str) -> &[TaskId] {
        self.index
            .get(id)
            .map(|&i| self.nodes[i].predecessors.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate successors of a task.
    pub fn successors_of(&self, id: &str) -> &[TaskId] {
        self.index
            .get(id)
            .map(|&i| self.nodes[i].successors.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks without predecessors.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|n| n.predecessors.is_empty())
            .map(|n| n.id.as_str())
    }

    /// Task ids in topological order (predecessors before successors).
    pub fn topo_order(&self) -> impl Iterator<Item = &str> {
        self.topo.iter().map(|&i| self.nodes[i].id.as_str())
    }

    /// All edges, in topological order of their source.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.topo.iter().flat_map(move |&i| {
            let node = &self.nodes[i];
            node.successors
                .iter()
                .map(move |s| (node.id.as_str(), s.as_str()))
        })
    }
}

fn topological_order(nodes: &[DagNode], index: &HashMap<TaskId, usize>) -> Result<Vec<usize>> {
    // Edge direction: predecessor -> successor.
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

    for i in 0..nodes.len() {
        graph.add_node(i);
    }

    for (i, node) in nodes.iter().enumerate() {
        for succ in node.successors.iter() {
            if let Some(&j) = index.get(succ) {
                graph.add_edge(i, j, ());
            }
        }
    }

    // A topological sort will fail if there is a cycle.
    if let Err(cycle) = toposort(&graph, None) {
        let node = &nodes[cycle.node_id()].id;
        return Err(DagError::DagCycle(format!(
            "cycle detected in task DAG involving task '{}'",
            node
        )));
    }

    // Acyclic: produce a stable order, ties broken by definition order.
    let mut in_degree: Vec<usize> = (0..nodes.len())
        .map(|i| graph.neighbors_directed(i, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for j in graph.neighbors_directed(i, Direction::Outgoing) {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    Ok(order)
}
