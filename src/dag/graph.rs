// src/dag/graph.rs

use std::collections::HashMap;

use crate::dag::node::TaskNode;
use crate::errors::{GraphError, Result};

/// Internal node structure: stores immediate deps and dependents by index.
#[derive(Debug, Clone)]
struct DagNode {
    name: String,
    /// Direct dependencies, in the order the node declared them.
    deps: Vec<usize>,
    /// Direct dependents, in ascending index order.
    dependents: Vec<usize>,
}

/// Index-based snapshot of a graph's edges taken at the start of a run.
///
/// Schedulers and runners address nodes by their position in this snapshot,
/// which matches the member order of the [`DependencyGraph`](crate::dag::DependencyGraph)
/// it was built from. Acyclicity is *not* checked here; that is the job of
/// the scheduler's `prepare`.
#[derive(Debug, Clone)]
pub struct DagTopology {
    nodes: Vec<DagNode>,
    index: HashMap<String, usize>,
}

impl DagTopology {
    /// Build a topology from `(name, dependency names)` pairs.
    pub fn new<I, D>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = String>,
    {
        let entries: Vec<(String, Vec<String>)> = entries
            .into_iter()
            .map(|(name, deps)| (name, deps.into_iter().collect()))
            .collect();

        let mut index = HashMap::with_capacity(entries.len());
        for (i, (name, _)) in entries.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(GraphError::DuplicateName(name.clone()));
            }
        }

        // First pass: resolve dependency names to indices.
        let mut nodes = Vec::with_capacity(entries.len());
        for (name, deps) in entries.iter() {
            let mut resolved = Vec::with_capacity(deps.len());
            for dep in deps {
                let dep_index = index.get(dep).copied().ok_or_else(|| {
                    GraphError::UnknownDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                resolved.push(dep_index);
            }
            nodes.push(DagNode {
                name: name.clone(),
                deps: resolved,
                dependents: Vec::new(),
            });
        }

        // Second pass: populate dependents based on deps.
        for i in 0..nodes.len() {
            let deps = nodes[i].deps.clone();
            for dep in deps {
                nodes[dep].dependents.push(i);
            }
        }

        Ok(Self { nodes, index })
    }

    /// Build a topology from graph members.
    pub fn from_nodes(nodes: &[TaskNode]) -> Result<Self> {
        Self::new(nodes.iter().map(|node| {
            let deps: Vec<String> = node
                .dependencies()
                .iter()
                .map(|d| d.name().to_string())
                .collect();
            (node.name().to_string(), deps)
        }))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.nodes[index].name
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Immediate dependencies of a node, in declaration order.
    pub fn dependencies_of(&self, index: usize) -> &[usize] {
        self.nodes
            .get(index)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, index: usize) -> &[usize] {
        self.nodes
            .get(index)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}
