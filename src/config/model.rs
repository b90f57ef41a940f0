// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::engine::ExecuteOptions;
use crate::types::{PoolKind, SchedulerKind, Strategy};
use crate::value::{Kwargs, Value};

/// A graph file exactly as read from TOML, before validation.
///
/// ```toml
/// [graph]
/// name = "report"
/// strategy = "pooled"
/// workers = 4
///
/// [task.load]
/// work = "value"
/// init_kwargs = { value = 3 }
///
/// [task.double]
/// work = "product"
/// after = ["load"]
/// init_kwargs = { factor = 2 }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGraphFile {
    #[serde(default)]
    pub graph: GraphSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskRecord>,
}

/// A graph file that passed validation: at least one task, every `after`
/// entry names a task, no self-dependencies and no cycles.
#[derive(Debug, Clone)]
pub struct GraphFile {
    pub graph: GraphSection,
    pub task: BTreeMap<String, TaskRecord>,
}

impl GraphFile {
    /// Construct without validation. Only [`TryFrom<RawGraphFile>`] should
    /// call this.
    pub(crate) fn new_unchecked(graph: GraphSection, task: BTreeMap<String, TaskRecord>) -> Self {
        Self { graph, task }
    }
}

/// `[graph]` section: identity and default run options.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSection {
    /// Registry name of the graph.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub strategy: Strategy,

    #[serde(default)]
    pub pool: PoolKind,

    /// Worker threads or processes; defaults to the available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default = "default_raise_immediately")]
    pub raise_immediately: bool,

    /// Falls back to `TASKGRAPH_SCHEDULER`, then to the petgraph scheduler.
    #[serde(default)]
    pub scheduler: Option<SchedulerKind>,

    /// Semaphore size for the cooperative runner.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

fn default_raise_immediately() -> bool {
    true
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            name: None,
            strategy: Strategy::default(),
            pool: PoolKind::default(),
            workers: None,
            raise_immediately: default_raise_immediately(),
            scheduler: None,
            max_concurrency: None,
        }
    }
}

impl GraphSection {
    /// Run options described by this section.
    pub fn options(&self) -> ExecuteOptions {
        let mut options = ExecuteOptions::default()
            .strategy(self.strategy)
            .pool_kind(self.pool)
            .raise_immediately(self.raise_immediately);
        if let Some(workers) = self.workers {
            options = options.worker_count(workers);
        }
        if let Some(kind) = self.scheduler {
            options = options.scheduler(kind);
        }
        if let Some(permits) = self.max_concurrency {
            options = options.max_concurrency(permits);
        }
        options
    }
}

/// `[task.<name>]` section: a plain record referencing work by key.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRecord {
    /// Key into the [`WorkTable`](crate::work::WorkTable) used to build the
    /// graph.
    pub work: String,

    /// Dependencies by task name. Order matters for positional arguments.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub output_names: Vec<String>,

    #[serde(default)]
    pub init_kwargs: BTreeMap<String, toml::Value>,
}

impl TaskRecord {
    pub fn new(work: impl Into<String>) -> Self {
        Self {
            work: work.into(),
            after: Vec::new(),
            output_names: Vec::new(),
            init_kwargs: BTreeMap::new(),
        }
    }

    /// `init_kwargs` converted to task values.
    pub fn kwargs(&self) -> Kwargs {
        self.init_kwargs
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value.clone())))
            .collect()
    }
}
