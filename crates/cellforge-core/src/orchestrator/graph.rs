//! Task dependency graph and topological ordering (spec.md §4.6).

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::domain::{AgentConfig, TaskId};
use crate::{Error, Result};

/// The admitted set of tasks and their dependency edges, with a
/// precomputed topological order.
#[derive(Debug)]
pub struct TaskGraph {
    configs: HashMap<TaskId, AgentConfig>,
    dependents: HashMap<TaskId, Vec<TaskId>>,
    topo_order: Vec<TaskId>,
}

impl TaskGraph {
    /// Build a graph from admitted configs. Fails with `Error::CyclicGraph`
    /// if Kahn's algorithm cannot fully drain the queue.
    pub fn build(configs: Vec<AgentConfig>) -> Result<Self> {
        let mut graph = DiGraph::<TaskId, ()>::new();
        let mut index_of: HashMap<TaskId, NodeIndex> = HashMap::new();

        for config in &configs {
            let idx = graph.add_node(config.task.id.clone());
            index_of.insert(config.task.id.clone(), idx);
        }

        for config in &configs {
            let to = index_of[&config.task.id];
            for dep in &config.task.dependencies {
                if let Some(&from) = index_of.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let topo_order = match petgraph::algo::toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|idx| graph[idx].clone()).collect(),
            Err(cycle) => {
                return Err(Error::CyclicGraph(format!(
                    "cycle detected at task {}",
                    graph[cycle.node_id()]
                )))
            }
        };

        let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for edge in graph.edge_references() {
            dependents
                .entry(graph[edge.source()].clone())
                .or_default()
                .push(graph[edge.target()].clone());
        }

        let configs = configs
            .into_iter()
            .map(|c| (c.task.id.clone(), c))
            .collect();

        Ok(Self {
            configs,
            dependents,
            topo_order,
        })
    }

    /// The tasks in a valid topological order.
    #[must_use]
    pub fn topo_order(&self) -> &[TaskId] {
        &self.topo_order
    }

    /// All admitted task configs, keyed by ID.
    #[must_use]
    pub fn configs(&self) -> &HashMap<TaskId, AgentConfig> {
        &self.configs
    }

    /// Tasks that directly depend on `id`.
    #[must_use]
    pub fn dependents_of(&self, id: &TaskId) -> &[TaskId] {
        self.dependents.get(id).map_or(&[], Vec::as_slice)
    }

    /// Tasks whose dependencies are all satisfied by `completed` and that
    /// are not themselves in `completed` or `excluded`.
    #[must_use]
    pub fn ready_wave(&self, completed: &HashSet<TaskId>, excluded: &HashSet<TaskId>) -> Vec<TaskId> {
        self.topo_order
            .iter()
            .filter(|id| !completed.contains(*id) && !excluded.contains(*id))
            .filter(|id| {
                self.configs[*id]
                    .task
                    .dependencies
                    .iter()
                    .all(|dep| completed.contains(dep))
            })
            .cloned()
            .collect()
    }
}
