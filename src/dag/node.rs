// src/dag/node.rs

//! Task nodes: a work item plus dependencies, output naming and hooks.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::dag::dependency_graph::{DependencyGraph, GraphShared};
use crate::errors::{GraphError, Result};
use crate::value::{Args, Kwargs, Value};
use crate::work::Work;

/// Hook run after argument assembly and before invocation. Returned kwargs
/// are merged over the assembled ones.
pub type PreCall = Arc<dyn Fn(&TaskNode, &Args) -> Option<Kwargs> + Send + Sync>;

/// Hook run after a successful invocation with the node's result and the
/// flattened results of its dependencies.
pub type PostCall = Arc<dyn Fn(&Value, &[Value]) + Send + Sync>;

struct NodeInner {
    name: String,
    work: Work,
    dependencies: Vec<TaskNode>,
    output_names: Vec<String>,
    pre_call: Option<PreCall>,
    post_call: Option<PostCall>,
    init_kwargs: Kwargs,
    /// The graph this node belongs to. Weak so that dropping the last graph
    /// handle detaches its members.
    membership: Mutex<Weak<GraphShared>>,
}

/// Shared handle to a task node.
///
/// Cloning is cheap and yields the same node. Identity is the node name:
/// equality and hashing both use it, and a graph refuses two distinct nodes
/// with the same name.
#[derive(Clone)]
pub struct TaskNode {
    inner: Arc<NodeInner>,
}

impl TaskNode {
    /// A standalone node without dependencies and with a random name.
    pub fn new(work: Work) -> Self {
        Self::from_builder(TaskNodeBuilder::new(work))
    }

    pub fn builder(work: Work) -> TaskNodeBuilder {
        TaskNodeBuilder::new(work)
    }

    fn from_builder(builder: TaskNodeBuilder) -> Self {
        let TaskNodeBuilder {
            work,
            name,
            dependencies,
            output_names,
            pre_call,
            post_call,
            init_kwargs,
        } = builder;

        Self {
            inner: Arc::new(NodeInner {
                name: name.unwrap_or_else(|| Uuid::new_v4().to_string()),
                work,
                dependencies,
                output_names,
                pre_call,
                post_call,
                init_kwargs,
                membership: Mutex::new(Weak::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn work(&self) -> &Work {
        &self.inner.work
    }

    pub fn is_async(&self) -> bool {
        self.inner.work.is_async()
    }

    pub fn dependencies(&self) -> &[TaskNode] {
        &self.inner.dependencies
    }

    pub fn output_names(&self) -> &[String] {
        &self.inner.output_names
    }

    pub fn init_kwargs(&self) -> &Kwargs {
        &self.inner.init_kwargs
    }

    pub fn pre_call(&self) -> Option<&PreCall> {
        self.inner.pre_call.as_ref()
    }

    pub fn post_call(&self) -> Option<&PostCall> {
        self.inner.post_call.as_ref()
    }

    /// The live graph this node belongs to, if any.
    pub fn graph(&self) -> Option<DependencyGraph> {
        self.inner
            .membership
            .lock()
            .upgrade()
            .map(DependencyGraph::from_shared)
    }

    /// Collect this node and `other` into a dependency list, e.g.
    /// `TaskNode::builder(w).after_all(a.and(&b))`.
    pub fn and(&self, other: &TaskNode) -> Vec<TaskNode> {
        vec![self.clone(), other.clone()]
    }

    /// Whether both handles point at the very same node.
    pub fn ptr_eq(&self, other: &TaskNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn membership(&self) -> Option<Arc<GraphShared>> {
        self.inner.membership.lock().upgrade()
    }

    pub(crate) fn set_membership(&self, graph: &Arc<GraphShared>) {
        *self.inner.membership.lock() = Arc::downgrade(graph);
    }

    /// Clear membership if it still points at `graph`.
    pub(crate) fn detach_from(&self, graph: &Arc<GraphShared>) {
        let mut membership = self.inner.membership.lock();
        if membership
            .upgrade()
            .is_some_and(|current| Arc::ptr_eq(&current, graph))
        {
            *membership = Weak::new();
        }
    }
}

impl PartialEq for TaskNode {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl Eq for TaskNode {}

impl Hash for TaskNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

impl fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deps: Vec<&str> = self.inner.dependencies.iter().map(|d| d.name()).collect();
        f.debug_struct("TaskNode")
            .field("name", &self.inner.name)
            .field("work", &self.inner.work)
            .field("dependencies", &deps)
            .field("output_names", &self.inner.output_names)
            .finish()
    }
}

/// Builder for [`TaskNode`].
pub struct TaskNodeBuilder {
    work: Work,
    name: Option<String>,
    dependencies: Vec<TaskNode>,
    output_names: Vec<String>,
    pre_call: Option<PreCall>,
    post_call: Option<PostCall>,
    init_kwargs: Kwargs,
}

impl TaskNodeBuilder {
    pub fn new(work: Work) -> Self {
        Self {
            work,
            name: None,
            dependencies: Vec::new(),
            output_names: Vec::new(),
            pre_call: None,
            post_call: None,
            init_kwargs: Kwargs::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add one dependency. Order matters for positional argument assembly.
    pub fn after(mut self, dependency: &TaskNode) -> Self {
        self.dependencies.push(dependency.clone());
        self
    }

    pub fn after_all<I>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = TaskNode>,
    {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn output_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn pre_call<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskNode, &Args) -> Option<Kwargs> + Send + Sync + 'static,
    {
        self.pre_call = Some(Arc::new(hook));
        self
    }

    pub fn post_call<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value, &[Value]) + Send + Sync + 'static,
    {
        self.post_call = Some(Arc::new(hook));
        self
    }

    pub fn init_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.init_kwargs.insert(name.into(), value.into());
        self
    }

    pub fn init_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.init_kwargs.extend(kwargs);
        self
    }

    /// Build the node.
    ///
    /// If any dependency already belongs to a graph, the new node joins that
    /// graph (together with any unattached dependencies). Dependencies spread
    /// over two different graphs are a [`GraphError::GraphConflict`].
    pub fn build(self) -> Result<TaskNode> {
        let node = TaskNode::from_builder(self);

        let mut target: Option<Arc<GraphShared>> = None;
        for dep in node.dependencies() {
            let Some(graph) = dep.membership() else {
                continue;
            };
            match &target {
                Some(existing) if !Arc::ptr_eq(existing, &graph) => {
                    return Err(GraphError::GraphConflict(format!(
                        "dependencies of task '{}' belong to different graphs",
                        node.name()
                    )));
                }
                Some(_) => {}
                None => target = Some(graph),
            }
        }

        if let Some(shared) = target {
            debug!(node = %node.name(), "joining dependency graph of its dependencies");
            DependencyGraph::from_shared(shared).add(&node)?;
        }

        Ok(node)
    }
}
