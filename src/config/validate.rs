// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{GraphFile, RawGraphFile, TaskRecord};
use crate::errors::{GraphError, Result};

impl TryFrom<RawGraphFile> for GraphFile {
    type Error = GraphError;

    fn try_from(raw: RawGraphFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_graph(&raw)?;
        Ok(GraphFile::new_unchecked(raw.graph, raw.task))
    }
}

fn validate_raw_graph(raw: &RawGraphFile) -> Result<()> {
    ensure_has_tasks(&raw.task)?;
    validate_graph_section(raw)?;
    validate_tasks(&raw.task)?;
    Ok(())
}

fn ensure_has_tasks(tasks: &BTreeMap<String, TaskRecord>) -> Result<()> {
    if tasks.is_empty() {
        return Err(GraphError::ConfigError(
            "graph file must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_graph_section(raw: &RawGraphFile) -> Result<()> {
    if raw.graph.workers == Some(0) {
        return Err(GraphError::ConfigError(
            "[graph].workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.graph.max_concurrency == Some(0) {
        return Err(GraphError::ConfigError(
            "[graph].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.graph.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(GraphError::ConfigError(
            "[graph].name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Structural checks shared by the file loader and
/// [`build_graph`](crate::config::build_graph): dependency references,
/// self-dependencies and cycles.
pub fn validate_tasks(tasks: &BTreeMap<String, TaskRecord>) -> Result<()> {
    validate_task_dependencies(tasks)?;
    validate_dag(tasks)
}

fn validate_task_dependencies(tasks: &BTreeMap<String, TaskRecord>) -> Result<()> {
    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(GraphError::Cycle(name.clone()));
            }
            if !tasks.contains_key(dep) {
                return Err(GraphError::UnknownDependency {
                    task: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_dag(tasks: &BTreeMap<String, TaskRecord>) -> Result<()> {
    // Edge direction: dep -> task
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(GraphError::Cycle(cycle.node_id().to_string())),
    }
}

/// Task names in an order where every task follows its dependencies.
/// Ties are broken by name.
pub(crate) fn topological_order(tasks: &BTreeMap<String, TaskRecord>) -> Result<Vec<String>> {
    validate_tasks(tasks)?;

    let mut remaining: BTreeMap<&str, usize> = tasks
        .iter()
        .map(|(name, task)| (name.as_str(), task.after.len()))
        .collect();
    let mut order = Vec::with_capacity(tasks.len());

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, pending)| **pending == 0)
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            // Unreachable after validate_tasks, kept as a hard stop.
            let stuck = remaining.keys().next().copied().unwrap_or_default();
            return Err(GraphError::Cycle(stuck.to_string()));
        }

        for name in ready {
            remaining.remove(name);
            for (other, task) in tasks.iter() {
                let hits = task.after.iter().filter(|dep| dep.as_str() == name).count();
                if hits > 0 {
                    if let Some(pending) = remaining.get_mut(other.as_str()) {
                        *pending -= hits;
                    }
                }
            }
            order.push(name.to_string());
        }
    }

    Ok(order)
}
