// src/dag/scheduler.rs

//! Incremental topological scheduling.
//!
//! A scheduler does not produce a static order. Runners repeatedly ask for
//! the nodes that became ready since the last call (`get_ready`) and report
//! completions (`done`), which may expose new ready nodes. Both
//! implementations here share the same readiness bookkeeping and emit
//! identical frontiers: newly ready nodes appear in ascending index order
//! within each `done` call.

use std::collections::VecDeque;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, trace};

use crate::dag::graph::DagTopology;
use crate::errors::{GraphError, Result};
use crate::types::SchedulerKind;

/// Ready-set tracker driven by the runners.
pub trait TopologicalScheduler: Send {
    /// Validate acyclicity and compute in-degrees. Must be called once before
    /// any other operation; fails with [`GraphError::Cycle`] on a cycle.
    fn prepare(&mut self) -> Result<()>;

    /// Whether any node remains undone.
    fn is_active(&self) -> bool;

    /// Nodes whose dependencies are all done and that have not been returned
    /// by an earlier call.
    fn get_ready(&mut self) -> Result<Vec<usize>>;

    /// Mark a previously returned node as complete.
    fn done(&mut self, node: usize) -> Result<()>;
}

/// Construct the scheduler implementation selected by `kind`.
pub fn create_scheduler(
    kind: SchedulerKind,
    topology: Arc<DagTopology>,
) -> Box<dyn TopologicalScheduler> {
    match kind {
        SchedulerKind::Kahn => Box::new(KahnScheduler::new(topology)),
        SchedulerKind::Petgraph => Box::new(PetgraphScheduler::new(topology)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Waiting,
    Emitted,
    Done,
}

/// Per-run readiness bookkeeping shared by both implementations.
#[derive(Debug, Default)]
struct Progress {
    state: Vec<NodeState>,
    in_degree: Vec<usize>,
    ready: VecDeque<usize>,
    remaining: usize,
    prepared: bool,
}

impl Progress {
    fn start(&mut self, in_degree: Vec<usize>) {
        self.state = vec![NodeState::Waiting; in_degree.len()];
        self.ready = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        self.remaining = in_degree.len();
        self.in_degree = in_degree;
        self.prepared = true;
    }

    fn ensure_prepared(&self, op: &str) -> Result<()> {
        if self.prepared {
            Ok(())
        } else {
            Err(GraphError::Scheduler(format!(
                "{op} called before prepare()"
            )))
        }
    }

    fn take_ready(&mut self) -> Result<Vec<usize>> {
        self.ensure_prepared("get_ready")?;
        let ready: Vec<usize> = self.ready.drain(..).collect();
        for &i in &ready {
            self.state[i] = NodeState::Emitted;
        }
        trace!(?ready, "scheduler emitted ready nodes");
        Ok(ready)
    }

    fn mark_done(&mut self, node: usize, mut dependents: Vec<usize>) -> Result<()> {
        self.ensure_prepared("done")?;
        match self.state.get(node) {
            Some(NodeState::Emitted) => {}
            Some(NodeState::Done) => {
                return Err(GraphError::Scheduler(format!(
                    "node #{node} was already marked done"
                )));
            }
            Some(NodeState::Waiting) => {
                return Err(GraphError::Scheduler(format!(
                    "node #{node} was marked done before it became ready"
                )));
            }
            None => {
                return Err(GraphError::Scheduler(format!("unknown node #{node}")));
            }
        }

        self.state[node] = NodeState::Done;
        self.remaining -= 1;

        dependents.sort_unstable();
        for dependent in dependents {
            let degree = &mut self.in_degree[dependent];
            *degree -= 1;
            if *degree == 0 {
                self.ready.push_back(dependent);
            }
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.prepared && self.remaining > 0
    }
}

/// Reference implementation: Kahn's algorithm over the index topology.
#[derive(Debug)]
pub struct KahnScheduler {
    topology: Arc<DagTopology>,
    progress: Progress,
}

impl KahnScheduler {
    pub fn new(topology: Arc<DagTopology>) -> Self {
        Self {
            topology,
            progress: Progress::default(),
        }
    }

    /// Walk unvisited dependencies until a node repeats; that node lies on
    /// a cycle. Every unvisited node has at least one unvisited dependency.
    fn node_on_cycle(&self, visited: &[bool]) -> Option<usize> {
        let start = visited.iter().position(|v| !v)?;
        let mut seen = vec![false; visited.len()];
        let mut current = start;
        loop {
            if seen[current] {
                return Some(current);
            }
            seen[current] = true;
            current = *self
                .topology
                .dependencies_of(current)
                .iter()
                .find(|d| !visited[**d])?;
        }
    }
}

impl TopologicalScheduler for KahnScheduler {
    fn prepare(&mut self) -> Result<()> {
        let n = self.topology.len();
        let in_degree: Vec<usize> = (0..n)
            .map(|i| self.topology.dependencies_of(i).len())
            .collect();

        // Dry run of Kahn's algorithm to detect cycles before anything runs.
        let mut remaining = in_degree.clone();
        let mut queue: VecDeque<usize> = (0..n).filter(|i| remaining[*i] == 0).collect();
        let mut visited = vec![false; n];
        while let Some(i) = queue.pop_front() {
            visited[i] = true;
            for &dependent in self.topology.dependents_of(i) {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if let Some(node) = self.node_on_cycle(&visited) {
            return Err(GraphError::Cycle(self.topology.name(node).to_string()));
        }

        debug!(nodes = n, "kahn scheduler prepared");
        self.progress.start(in_degree);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.progress.is_active()
    }

    fn get_ready(&mut self) -> Result<Vec<usize>> {
        self.progress.take_ready()
    }

    fn done(&mut self, node: usize) -> Result<()> {
        let dependents = self.topology.dependents_of(node).to_vec();
        self.progress.mark_done(node, dependents)
    }
}

/// `petgraph`-backed implementation.
///
/// Edge direction: dependency -> dependent. Node weights are indices into the
/// topology, and petgraph node indices are assigned in the same order.
#[derive(Debug)]
pub struct PetgraphScheduler {
    topology: Arc<DagTopology>,
    graph: DiGraph<usize, ()>,
    progress: Progress,
}

impl PetgraphScheduler {
    pub fn new(topology: Arc<DagTopology>) -> Self {
        Self {
            topology,
            graph: DiGraph::new(),
            progress: Progress::default(),
        }
    }
}

impl TopologicalScheduler for PetgraphScheduler {
    fn prepare(&mut self) -> Result<()> {
        let n = self.topology.len();
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(n, n);
        for i in 0..n {
            graph.add_node(i);
        }
        for i in 0..n {
            for &dep in self.topology.dependencies_of(i) {
                graph.add_edge(NodeIndex::new(dep), NodeIndex::new(i), ());
            }
        }

        // A topological sort will fail if there is a cycle.
        if let Err(cycle) = toposort(&graph, None) {
            let node = graph[cycle.node_id()];
            return Err(GraphError::Cycle(self.topology.name(node).to_string()));
        }

        let in_degree = graph
            .node_indices()
            .map(|ix| graph.neighbors_directed(ix, Direction::Incoming).count())
            .collect();

        debug!(nodes = n, edges = graph.edge_count(), "petgraph scheduler prepared");
        self.graph = graph;
        self.progress.start(in_degree);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.progress.is_active()
    }

    fn get_ready(&mut self) -> Result<Vec<usize>> {
        self.progress.take_ready()
    }

    fn done(&mut self, node: usize) -> Result<()> {
        if node >= self.graph.node_count() {
            return Err(GraphError::Scheduler(format!("unknown node #{node}")));
        }
        let dependents = self
            .graph
            .neighbors_directed(NodeIndex::new(node), Direction::Outgoing)
            .map(|ix| self.graph[ix])
            .collect();
        self.progress.mark_done(node, dependents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(entries: &[(&str, &[&str])]) -> Arc<DagTopology> {
        Arc::new(
            DagTopology::new(entries.iter().map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
                )
            }))
            .unwrap(),
        )
    }

    fn both(topo: &Arc<DagTopology>) -> Vec<Box<dyn TopologicalScheduler>> {
        vec![
            create_scheduler(SchedulerKind::Kahn, Arc::clone(topo)),
            create_scheduler(SchedulerKind::Petgraph, Arc::clone(topo)),
        ]
    }

    #[test]
    fn ready_nodes_are_emitted_once() {
        let topo = topology(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        for mut s in both(&topo) {
            s.prepare().unwrap();
            assert!(s.is_active());
            assert_eq!(s.get_ready().unwrap(), vec![0]);
            assert!(s.get_ready().unwrap().is_empty());

            s.done(0).unwrap();
            assert_eq!(s.get_ready().unwrap(), vec![1, 2]);

            s.done(2).unwrap();
            assert!(s.get_ready().unwrap().is_empty());
            s.done(1).unwrap();
            assert_eq!(s.get_ready().unwrap(), vec![3]);
            s.done(3).unwrap();
            assert!(!s.is_active());
        }
    }

    #[test]
    fn cycle_is_reported_before_anything_is_ready() {
        let topo = topology(&[("root", &[]), ("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
        for mut s in both(&topo) {
            match s.prepare() {
                Err(GraphError::Cycle(name)) => assert!(["a", "b", "c"].contains(&name.as_str())),
                other => panic!("expected cycle error, got {other:?}"),
            }
            assert!(!s.is_active());
            assert!(s.get_ready().is_err());
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let topo = topology(&[("a", &["a"])]);
        for mut s in both(&topo) {
            assert!(matches!(s.prepare(), Err(GraphError::Cycle(_))));
        }
    }

    #[test]
    fn misuse_is_an_error() {
        let topo = topology(&[("a", &[]), ("b", &["a"])]);
        for mut s in both(&topo) {
            assert!(s.done(0).is_err());
            s.prepare().unwrap();
            assert!(s.done(1).is_err(), "b was never emitted");
            s.get_ready().unwrap();
            s.done(0).unwrap();
            assert!(s.done(0).is_err(), "a is already done");
        }
    }
}
