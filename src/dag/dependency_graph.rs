// src/dag/dependency_graph.rs

//! The graph object callers build and execute.
//!
//! A [`DependencyGraph`] is a shared handle: clones refer to the same member
//! set and the same cached results. Members point back at their graph with a
//! weak reference, so once the last handle is dropped every member reports
//! `graph() == None` again and can join another graph.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::dag::node::TaskNode;
use crate::dag::registry::RegistryInner;
use crate::dag::results::ResultsMap;
use crate::engine::{self, ExecuteOptions};
use crate::errors::{GraphError, Result};

#[derive(Default)]
struct GraphState {
    /// Members in insertion order; dependencies precede their dependents
    /// when they were added together.
    members: Vec<TaskNode>,
    results: Option<ResultsMap>,
}

pub(crate) struct GraphShared {
    name: Option<String>,
    state: Mutex<GraphState>,
    running: AtomicBool,
    registry: Mutex<Weak<RegistryInner>>,
}

/// Either side of [`DependencyGraph::combine`].
#[derive(Debug, Clone)]
pub enum GraphPart {
    Node(TaskNode),
    Graph(DependencyGraph),
}

impl From<TaskNode> for GraphPart {
    fn from(node: TaskNode) -> Self {
        GraphPart::Node(node)
    }
}

impl From<&TaskNode> for GraphPart {
    fn from(node: &TaskNode) -> Self {
        GraphPart::Node(node.clone())
    }
}

impl From<DependencyGraph> for GraphPart {
    fn from(graph: DependencyGraph) -> Self {
        GraphPart::Graph(graph)
    }
}

impl From<&DependencyGraph> for GraphPart {
    fn from(graph: &DependencyGraph) -> Self {
        GraphPart::Graph(graph.clone())
    }
}

impl GraphPart {
    fn graph(&self) -> Option<DependencyGraph> {
        match self {
            GraphPart::Node(node) => node.graph(),
            GraphPart::Graph(graph) => Some(graph.clone()),
        }
    }
}

#[derive(Clone)]
pub struct DependencyGraph {
    shared: Arc<GraphShared>,
}

impl DependencyGraph {
    /// An unnamed graph holding `tasks` and everything they depend on.
    pub fn new<I>(tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaskNode>,
    {
        Self::create(None, tasks)
    }

    /// A named graph, eligible for registration in a
    /// [`GraphRegistry`](crate::dag::GraphRegistry).
    pub fn named<I>(name: impl Into<String>, tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaskNode>,
    {
        Self::create(Some(name.into()), tasks)
    }

    fn create<I>(name: Option<String>, tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = TaskNode>,
    {
        let graph = Self {
            shared: Arc::new(GraphShared {
                name,
                state: Mutex::new(GraphState::default()),
                running: AtomicBool::new(false),
                registry: Mutex::new(Weak::new()),
            }),
        };
        for task in tasks {
            graph.add(&task)?;
        }
        Ok(graph)
    }

    pub(crate) fn from_shared(shared: Arc<GraphShared>) -> Self {
        Self { shared }
    }

    /// Union of two nodes or graphs.
    ///
    /// - both sides already in the same graph: that graph
    /// - one side in a graph: the other side joins it
    /// - neither side in a graph: a new unnamed graph holding both
    /// - sides in two different graphs: [`GraphError::GraphConflict`]
    pub fn combine(a: impl Into<GraphPart>, b: impl Into<GraphPart>) -> Result<Self> {
        let (a, b) = (a.into(), b.into());

        let target = match (a.graph(), b.graph()) {
            (Some(ga), Some(gb)) if !ga.ptr_eq(&gb) => {
                return Err(GraphError::GraphConflict(
                    "cannot combine members of two different graphs".to_string(),
                ));
            }
            (Some(g), _) | (None, Some(g)) => g,
            (None, None) => Self::new([])?,
        };

        for part in [a, b] {
            if let GraphPart::Node(node) = part {
                target.add(&node)?;
            }
        }
        Ok(target)
    }

    /// Add `node` and its transitive dependencies.
    ///
    /// All checks happen before anything is attached, so a failed add leaves
    /// the graph unchanged. Adding a node that is already a member is a
    /// no-op.
    pub fn add(&self, node: &TaskNode) -> Result<()> {
        let closure = dependency_closure(node);

        let mut state = self.shared.state.lock();

        let mut names: HashSet<&str> = state.members.iter().map(TaskNode::name).collect();
        let mut pending = Vec::new();
        for candidate in &closure {
            if let Some(owner) = candidate.membership() {
                if Arc::ptr_eq(&owner, &self.shared) {
                    continue;
                }
                return Err(GraphError::GraphConflict(format!(
                    "task '{}' already belongs to another graph",
                    candidate.name()
                )));
            }
            if !names.insert(candidate.name()) {
                return Err(GraphError::DuplicateName(candidate.name().to_string()));
            }
            pending.push(candidate);
        }

        if pending.is_empty() {
            return Ok(());
        }
        if self.shared.running.load(Ordering::SeqCst) {
            return Err(GraphError::AlreadyRunning);
        }

        for candidate in pending {
            candidate.set_membership(&self.shared);
            state.members.push(candidate.clone());
        }
        if state.results.take().is_some() {
            debug!(graph = ?self.name(), "membership changed; cached results dropped");
        }
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    /// Members in insertion order.
    pub fn nodes(&self) -> Vec<TaskNode> {
        self.shared.state.lock().members.clone()
    }

    pub fn node(&self, name: &str) -> Option<TaskNode> {
        self.shared
            .state
            .lock()
            .members
            .iter()
            .find(|node| node.name() == name)
            .cloned()
    }

    pub fn contains(&self, node: &TaskNode) -> bool {
        self.shared
            .state
            .lock()
            .members
            .iter()
            .any(|member| member.ptr_eq(node))
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().members.is_empty()
    }

    /// Member name -> names of its direct dependencies.
    pub fn unsorted(&self) -> BTreeMap<String, Vec<String>> {
        self.shared
            .state
            .lock()
            .members
            .iter()
            .map(|node| {
                let deps = node
                    .dependencies()
                    .iter()
                    .map(|dep| dep.name().to_string())
                    .collect();
                (node.name().to_string(), deps)
            })
            .collect()
    }

    /// True if any member wraps async work.
    pub fn is_async(&self) -> bool {
        self.shared
            .state
            .lock()
            .members
            .iter()
            .any(TaskNode::is_async)
    }

    /// Results of the last completed run, if any.
    pub fn results(&self) -> Option<ResultsMap> {
        self.shared.state.lock().results.clone()
    }

    /// Forget cached results so the next `execute` runs every node again.
    pub fn reset(&self) {
        self.shared.state.lock().results = None;
    }

    pub fn ptr_eq(&self, other: &DependencyGraph) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Run the graph to completion, blocking the calling thread.
    ///
    /// A graph that already completed returns its cached results without
    /// invoking any work. Must not be called from inside a tokio runtime when
    /// the cooperative runner is selected; use
    /// [`execute_async`](Self::execute_async) there.
    pub fn execute(&self, options: &ExecuteOptions) -> Result<ResultsMap> {
        engine::execute_graph(self, options)
    }

    /// Run the graph on the current tokio runtime. Every strategy runs as
    /// cooperative units on the current thread.
    pub async fn execute_async(&self, options: &ExecuteOptions) -> Result<ResultsMap> {
        engine::execute_graph_async(self, options).await
    }

    /// Unregister from the owning registry and detach all members.
    pub fn dispose(&self) {
        let registry = std::mem::take(&mut *self.shared.registry.lock()).upgrade();
        if let (Some(registry), Some(name)) = (registry, self.name()) {
            if registry.remove_if_same(name, self) {
                debug!(graph = %name, "graph removed from registry on dispose");
            }
        }

        let members = {
            let mut state = self.shared.state.lock();
            state.results = None;
            std::mem::take(&mut state.members)
        };
        for node in &members {
            node.detach_from(&self.shared);
        }
        info!(graph = ?self.name(), nodes = members.len(), "graph disposed");
    }

    pub(crate) fn set_registry(&self, registry: Option<&Arc<RegistryInner>>) {
        *self.shared.registry.lock() = registry.map(Arc::downgrade).unwrap_or_default();
    }

    /// Claim the graph for one run. The claim is released when the guard
    /// drops.
    pub(crate) fn begin_run(&self) -> Result<RunGuard<'_>> {
        self.shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| GraphError::AlreadyRunning)?;
        Ok(RunGuard { graph: self })
    }

    pub(crate) fn store_results(&self, results: &ResultsMap) {
        self.shared.state.lock().results = Some(results.clone());
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        let members: Vec<&str> = state.members.iter().map(TaskNode::name).collect();
        f.debug_struct("DependencyGraph")
            .field("name", &self.shared.name)
            .field("members", &members)
            .field("cached", &state.results.is_some())
            .finish()
    }
}

pub(crate) struct RunGuard<'a> {
    graph: &'a DependencyGraph,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.graph.shared.running.store(false, Ordering::SeqCst);
    }
}

/// `node` plus all transitive dependencies, dependencies first. Nodes are
/// deduplicated by identity, not by name, so name clashes surface later as
/// [`GraphError::DuplicateName`].
fn dependency_closure(node: &TaskNode) -> Vec<TaskNode> {
    fn visit(node: &TaskNode, out: &mut Vec<TaskNode>) {
        if out.iter().any(|seen| seen.ptr_eq(node)) {
            return;
        }
        for dep in node.dependencies() {
            visit(dep, out);
        }
        out.push(node.clone());
    }

    let mut out = Vec::new();
    visit(node, &mut out);
    out
}
