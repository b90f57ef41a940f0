// src/config/build.rs

//! Declarative graph construction from task records plus a work table.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::model::{GraphFile, TaskRecord};
use crate::config::validate::topological_order;
use crate::dag::{DependencyGraph, TaskNode};
use crate::errors::{GraphError, Result};
use crate::work::WorkTable;

/// Build a graph from `tasks`, resolving each record's `work` in `table`.
///
/// Every work reference and dependency name is checked before any node is
/// created: an unknown work key fails with [`GraphError::UnknownWork`], an
/// unknown dependency with [`GraphError::UnknownDependency`] and a cycle with
/// [`GraphError::Cycle`].
pub fn build_graph(
    name: Option<&str>,
    tasks: &BTreeMap<String, TaskRecord>,
    table: &WorkTable,
) -> Result<DependencyGraph> {
    for (task, record) in tasks {
        if !table.contains(&record.work) {
            return Err(GraphError::UnknownWork {
                task: task.clone(),
                work: record.work.clone(),
            });
        }
    }

    let order = topological_order(tasks)?;

    let mut built: BTreeMap<&str, TaskNode> = BTreeMap::new();
    for task in &order {
        let Some((task, record)) = tasks.get_key_value(task.as_str()) else {
            continue;
        };
        let work = table.get(&record.work).ok_or_else(|| GraphError::UnknownWork {
            task: task.clone(),
            work: record.work.clone(),
        })?;

        let mut builder = TaskNode::builder(work)
            .name(task.clone())
            .output_names(record.output_names.iter().cloned())
            .init_kwargs(record.kwargs());
        for dep in &record.after {
            let dep_node = built.get(dep.as_str()).ok_or_else(|| GraphError::UnknownDependency {
                task: task.clone(),
                dependency: dep.clone(),
            })?;
            builder = builder.after(dep_node);
        }

        debug!(task = %task, work = %record.work, deps = record.after.len(), "built task node");
        built.insert(task.as_str(), builder.build()?);
    }

    let nodes = order
        .iter()
        .filter_map(|task| built.get(task.as_str()).cloned());
    match name {
        Some(name) => DependencyGraph::named(name, nodes),
        None => DependencyGraph::new(nodes),
    }
}

impl GraphFile {
    /// Build the graph described by this file.
    pub fn build(&self, table: &WorkTable) -> Result<DependencyGraph> {
        build_graph(self.graph.name.as_deref(), &self.task, table)
    }
}
