#![allow(dead_code)]

use std::collections::BTreeMap;

use taskgraph::config::{GraphFile, GraphSection, RawGraphFile, TaskRecord};
use taskgraph::types::{PoolKind, Strategy};

/// Builder for `GraphFile` to simplify test setup.
pub struct GraphFileBuilder {
    file: RawGraphFile,
}

impl GraphFileBuilder {
    pub fn new() -> Self {
        Self {
            file: RawGraphFile {
                graph: GraphSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskRecord) -> Self {
        self.file.task.insert(name.to_string(), task);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.file.graph.name = Some(name.to_string());
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.file.graph.strategy = strategy;
        self
    }

    pub fn pool(mut self, pool: PoolKind) -> Self {
        self.file.graph.pool = pool;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.file.graph.workers = Some(workers);
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.file.graph.raise_immediately = false;
        self
    }

    /// The unvalidated file, for tests that exercise validation.
    pub fn raw(self) -> RawGraphFile {
        self.file
    }

    pub fn build(self) -> GraphFile {
        GraphFile::try_from(self.file).expect("Failed to build valid graph file from builder")
    }
}

impl Default for GraphFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskRecord`.
pub struct TaskRecordBuilder {
    task: TaskRecord,
}

impl TaskRecordBuilder {
    pub fn new(work: &str) -> Self {
        Self {
            task: TaskRecord::new(work),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn output_names(mut self, names: &[&str]) -> Self {
        self.task.output_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn init_kwarg(mut self, name: &str, value: impl Into<toml::Value>) -> Self {
        self.task.init_kwargs.insert(name.to_string(), value.into());
        self
    }

    pub fn build(self) -> TaskRecord {
        self.task
    }
}
