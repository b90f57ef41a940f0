// src/dag/registry.rs

//! Explicit name -> graph registry.
//!
//! A registry is an ordinary value owned by the host program; there is no
//! global instance. Entries stay until they are unregistered or the graph is
//! disposed with [`DependencyGraph::dispose`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dag::dependency_graph::DependencyGraph;
use crate::errors::{GraphError, Result};

#[derive(Default)]
pub(crate) struct RegistryInner {
    graphs: Mutex<BTreeMap<String, DependencyGraph>>,
}

impl RegistryInner {
    /// Remove `name` only if it still maps to `graph`.
    pub(crate) fn remove_if_same(&self, name: &str, graph: &DependencyGraph) -> bool {
        let mut graphs = self.graphs.lock();
        match graphs.get(name) {
            Some(current) if current.ptr_eq(graph) => {
                graphs.remove(name);
                true
            }
            _ => false,
        }
    }
}

/// Cheaply cloneable handle; clones share the same entries.
#[derive(Clone, Default)]
pub struct GraphRegistry {
    inner: Arc<RegistryInner>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named graph. An existing entry under the same name is
    /// replaced.
    pub fn register(&self, graph: &DependencyGraph) -> Result<()> {
        let name = graph.name().ok_or(GraphError::UnnamedGraph)?.to_string();

        let previous = self.inner.graphs.lock().insert(name.clone(), graph.clone());
        if let Some(previous) = previous {
            if !previous.ptr_eq(graph) {
                warn!(graph = %name, "replacing previously registered graph");
                previous.set_registry(None);
            }
        }

        graph.set_registry(Some(&self.inner));
        debug!(graph = %name, "graph registered");
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<DependencyGraph> {
        self.inner.graphs.lock().get(name).cloned()
    }

    pub fn unregister(&self, name: &str) -> Option<DependencyGraph> {
        let removed = self.inner.graphs.lock().remove(name);
        if let Some(graph) = &removed {
            graph.set_registry(None);
            debug!(graph = %name, "graph unregistered");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.graphs.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.graphs.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.graphs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.graphs.lock().is_empty()
    }
}

impl std::fmt::Debug for GraphRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::node::TaskNode;
    use crate::value::Value;
    use crate::work::Work;

    fn graph(name: &str) -> DependencyGraph {
        let node = TaskNode::new(Work::sync(|_| Ok(Value::Null)));
        DependencyGraph::named(name, [node]).unwrap()
    }

    #[test]
    fn register_lookup_unregister() {
        let registry = GraphRegistry::new();
        let g = graph("etl");
        registry.register(&g).unwrap();

        assert!(registry.lookup("etl").is_some_and(|found| found.ptr_eq(&g)));
        assert_eq!(registry.names(), vec!["etl".to_string()]);

        assert!(registry.unregister("etl").is_some());
        assert!(registry.lookup("etl").is_none());
        assert!(registry.unregister("etl").is_none());
    }

    #[test]
    fn unnamed_graphs_cannot_be_registered() {
        let registry = GraphRegistry::new();
        let g = DependencyGraph::new([TaskNode::new(Work::sync(|_| Ok(Value::Null)))]).unwrap();
        assert!(matches!(registry.register(&g), Err(GraphError::UnnamedGraph)));
    }

    #[test]
    fn dispose_removes_the_entry() {
        let registry = GraphRegistry::new();
        let g = graph("nightly");
        registry.register(&g).unwrap();

        g.dispose();
        assert!(!registry.contains("nightly"));
        assert!(g.is_empty());
    }

    #[test]
    fn re_registering_a_name_replaces_the_entry() {
        let registry = GraphRegistry::new();
        let first = graph("job");
        let second = graph("job");
        registry.register(&first).unwrap();
        registry.register(&second).unwrap();

        assert!(registry.lookup("job").is_some_and(|g| g.ptr_eq(&second)));

        // Disposing the replaced graph must not remove its successor.
        first.dispose();
        assert!(registry.contains("job"));
    }
}
