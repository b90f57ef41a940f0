// src/errors.rs

//! Crate-wide error types.
//!
//! Construction and scheduling problems are reported as [`GraphError`]
//! variants and are always fatal. Failures raised by task bodies are captured
//! as [`TaskFailure`] values first; depending on the run mode they are either
//! recorded in the [`ResultsMap`] or surfaced through [`GraphError::Task`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::dag::ResultsMap;

/// A failure captured from a task body.
///
/// Cheap to clone so that the same failure can live in a cached
/// [`ResultsMap`] and be handed back on replay.
#[derive(Clone)]
pub struct TaskFailure {
    node: String,
    error: Arc<anyhow::Error>,
}

impl TaskFailure {
    pub fn new(node: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            node: node.into(),
            error: Arc::new(error),
        }
    }

    /// Name of the node whose body failed.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The original error returned (or panic raised) by the task body.
    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    /// Rendered error chain, e.g. `"loading rows: file not found"`.
    pub fn message(&self) -> String {
        format!("{:#}", self.error)
    }

    /// Attempt to downcast the underlying error to a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFailure")
            .field("node", &self.node)
            .field("error", &self.message())
            .finish()
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task '{}' failed: {:#}", self.node, self.error)
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&**self.error)
    }
}

/// Two failures are equal when they come from the same node with the same
/// rendered message; the error objects themselves are not comparable.
impl PartialEq for TaskFailure {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.message() == other.message()
    }
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Cycle detected in task graph involving node '{0}'")]
    Cycle(String),

    #[error("Graph conflict: {0}")]
    GraphConflict(String),

    #[error("Duplicate node name in graph: {0}")]
    DuplicateName(String),

    #[error(transparent)]
    Task(#[from] TaskFailure),

    #[error(
        "All available nodes are waiting on a dependency that has failed ({} partial results)",
        .0.len()
    )]
    PartialFailureDeadlock(ResultsMap),

    #[error("Unknown work reference '{work}' for task '{task}'")]
    UnknownWork { task: String, work: String },

    #[error("Task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("Graph is already executing")]
    AlreadyRunning,

    #[error("Blocking cooperative run requested inside a tokio runtime; use execute_async")]
    NestedRuntime,

    #[error("Graph has no name and cannot be registered")]
    UnnamedGraph,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GraphError {
    /// The task failure that aborted a `raise_immediately` run, if any.
    pub fn task_failure(&self) -> Option<&TaskFailure> {
        match self {
            GraphError::Task(failure) => Some(failure),
            _ => None,
        }
    }

    /// The partial results carried by a [`GraphError::PartialFailureDeadlock`].
    pub fn partial_results(&self) -> Option<&ResultsMap> {
        match self {
            GraphError::PartialFailureDeadlock(results) => Some(results),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GraphError>;
