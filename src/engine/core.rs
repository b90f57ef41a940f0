// src/engine/core.rs

//! Run core shared by every runner.
//!
//! `RunCore` owns the scheduler and the partial results of one run. It knows
//! nothing about threads, processes or futures: runners ask it for the next
//! batch of calls, execute them however they like, and hand back each
//! outcome. Keeping the bookkeeping here is what makes the three strategies
//! observably equivalent.
//!
//! The core is unit tested without any runtime, pool or channel.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::DagTopology;
use crate::dag::node::{PostCall, PreCall, TaskNode};
use crate::dag::results::{Outcome, ResultsMap};
use crate::dag::scheduler::{create_scheduler, TopologicalScheduler};
use crate::engine::arguments;
use crate::engine::ExecuteOptions;
use crate::errors::{GraphError, Result, TaskFailure};
use crate::value::{Args, Value};

/// A ready node with its fully assembled arguments.
#[derive(Debug, Clone)]
pub struct NodeCall {
    /// Position of the node in the run's topology.
    pub index: usize,
    pub node: TaskNode,
    pub args: Args,
}

pub struct RunCore {
    nodes: Vec<TaskNode>,
    topology: Arc<DagTopology>,
    scheduler: Box<dyn TopologicalScheduler>,
    pre_call: Option<PreCall>,
    post_call: Option<PostCall>,
    raise_immediately: bool,
    outcomes: Vec<Option<Outcome>>,
    results: ResultsMap,
    in_flight: usize,
    blocked: Vec<usize>,
    succeeded: usize,
}

impl fmt::Debug for RunCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunCore")
            .field("nodes", &self.nodes.len())
            .field("in_flight", &self.in_flight)
            .field("blocked", &self.blocked)
            .field("recorded", &self.results.len())
            .finish_non_exhaustive()
    }
}

impl RunCore {
    /// Snapshot `nodes` and prepare a fresh scheduler. Fails with
    /// [`GraphError::Cycle`] before anything runs.
    pub fn new(nodes: Vec<TaskNode>, options: &ExecuteOptions) -> Result<Self> {
        let topology = Arc::new(DagTopology::from_nodes(&nodes)?);
        let mut scheduler = create_scheduler(options.scheduler, Arc::clone(&topology));
        scheduler.prepare()?;

        let outcomes = vec![None; nodes.len()];
        Ok(Self {
            nodes,
            topology,
            scheduler,
            pre_call: options.pre_call.clone(),
            post_call: options.post_call.clone(),
            raise_immediately: options.raise_immediately,
            outcomes,
            results: ResultsMap::new(),
            in_flight: 0,
            blocked: Vec::new(),
            succeeded: 0,
        })
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn is_active(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Calls handed out and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Fetch newly ready nodes and turn the eligible ones into calls.
    ///
    /// In best-effort mode a ready node with a failed dependency is held back:
    /// it is never dispatched and never gets an entry.
    pub fn next_frontier(&mut self) -> Result<Vec<NodeCall>> {
        let ready = self.next_ready()?;
        Ok(ready.into_iter().map(|index| self.call_for(index)).collect())
    }

    /// Like [`next_frontier`](Self::next_frontier) but hands out indices
    /// only. Each index counts as in flight and must be passed to
    /// [`call_for`](Self::call_for) before it runs.
    pub fn next_ready(&mut self) -> Result<Vec<usize>> {
        let ready = self.scheduler.get_ready()?;
        let mut eligible = Vec::with_capacity(ready.len());

        for index in ready {
            if !self.raise_immediately && self.has_failed_dependency(index) {
                debug!(node = %self.nodes[index].name(), "holding back node with a failed dependency");
                self.blocked.push(index);
                continue;
            }
            self.in_flight += 1;
            eligible.push(index);
        }

        Ok(eligible)
    }

    /// Assemble the arguments of an index from [`next_ready`](Self::next_ready)
    /// and apply the pre-call hook.
    pub fn call_for(&self, index: usize) -> NodeCall {
        let node = self.nodes[index].clone();
        let args = self.prepare_args(index, &node);
        debug!(node = %node.name(), args = args.len(), "dispatching node");
        NodeCall { index, node, args }
    }

    /// Record the outcome of a dispatched call and mark it done.
    ///
    /// With `raise_immediately` a failure ends the run here and is returned
    /// as [`GraphError::Task`].
    pub fn complete(&mut self, index: usize, outcome: anyhow::Result<Value>) -> Result<()> {
        self.in_flight = self.in_flight.saturating_sub(1);
        let node = self.nodes.get(index).cloned().ok_or_else(|| {
            GraphError::Scheduler(format!("completion for unknown node #{index}"))
        })?;

        let outcome = match outcome {
            Ok(value) => {
                self.run_post_call(index, &node, &value);
                self.succeeded += 1;
                debug!(node = %node.name(), "node succeeded");
                Ok(value)
            }
            Err(error) => {
                let failure = TaskFailure::new(node.name(), error);
                if self.raise_immediately {
                    warn!(node = %node.name(), error = %failure.message(), "node failed; aborting run");
                    return Err(GraphError::Task(failure));
                }
                warn!(node = %node.name(), error = %failure.message(), "node failed; continuing");
                Err(failure)
            }
        };

        self.scheduler.done(index)?;
        self.results.record(node.name(), outcome.clone());
        self.outcomes[index] = Some(outcome);
        Ok(())
    }

    /// Close the run once nothing is in flight.
    ///
    /// A scheduler that is still active at this point has stalled on failed
    /// ancestors. If no node produced a value that is a
    /// [`GraphError::PartialFailureDeadlock`]; otherwise the partial results
    /// are returned with the held-back nodes absent.
    pub fn finish(self) -> Result<ResultsMap> {
        if self.scheduler.is_active() {
            let blocked: Vec<&str> = self
                .blocked
                .iter()
                .map(|&i| self.topology.name(i))
                .collect();

            if self.succeeded == 0 {
                warn!(?blocked, "no node can make progress; run deadlocked");
                return Err(GraphError::PartialFailureDeadlock(self.results));
            }
            warn!(
                ?blocked,
                recorded = self.results.len(),
                "run finished with nodes blocked by failed dependencies"
            );
        } else {
            info!(recorded = self.results.len(), "run finished");
        }
        Ok(self.results)
    }

    fn has_failed_dependency(&self, index: usize) -> bool {
        self.topology
            .dependencies_of(index)
            .iter()
            .any(|&dep| matches!(self.outcomes[dep], Some(Err(_))))
    }

    fn dependency_values(&self, index: usize) -> impl Iterator<Item = (usize, &Value)> {
        self.topology
            .dependencies_of(index)
            .iter()
            .filter_map(|&dep| match &self.outcomes[dep] {
                Some(Ok(value)) => Some((dep, value)),
                _ => None,
            })
    }

    fn prepare_args(&self, index: usize, node: &TaskNode) -> Args {
        let mut args = arguments::assemble(
            self.dependency_values(index)
                .map(|(dep, value)| (self.nodes[dep].output_names(), value)),
        );

        if let Some(hook) = node.pre_call().or(self.pre_call.as_ref()) {
            if let Some(overrides) = hook(node, &args) {
                args.keyword.extend(overrides);
            }
        }

        args.keyword
            .extend(node.init_kwargs().iter().map(|(k, v)| (k.clone(), v.clone())));
        args
    }

    fn run_post_call(&self, index: usize, node: &TaskNode, value: &Value) {
        if let Some(hook) = node.post_call().or(self.post_call.as_ref()) {
            let dependency_results =
                arguments::flatten(self.dependency_values(index).map(|(_, value)| value));
            hook(value, &dependency_results);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::Work;
    use anyhow::anyhow;
    use parking_lot::Mutex;

    fn node(name: &str, deps: &[&TaskNode]) -> TaskNode {
        TaskNode::builder(Work::sync(|_| Ok(Value::Null)))
            .name(name)
            .after_all(deps.iter().map(|d| (*d).clone()))
            .build()
            .unwrap()
    }

    fn names(calls: &[NodeCall]) -> Vec<&str> {
        calls.iter().map(|c| c.node.name()).collect()
    }

    #[test]
    fn frontier_advances_as_results_arrive() {
        let a = node("a", &[]);
        let b = node("b", &[&a]);
        let mut core = RunCore::new(vec![a, b], &ExecuteOptions::default()).unwrap();

        let first = core.next_frontier().unwrap();
        assert_eq!(names(&first), ["a"]);
        assert_eq!(core.in_flight(), 1);
        assert!(core.next_frontier().unwrap().is_empty());

        core.complete(0, Ok(Value::Int(5))).unwrap();
        let second = core.next_frontier().unwrap();
        assert_eq!(names(&second), ["b"]);
        assert_eq!(second[0].args.positional, vec![Value::Int(5)]);

        core.complete(1, Ok(Value::Null)).unwrap();
        assert!(!core.is_active());
        assert_eq!(core.finish().unwrap().len(), 2);
    }

    #[test]
    fn hook_and_init_kwarg_precedence() {
        let a = TaskNode::builder(Work::sync(|_| Ok(Value::Null)))
            .name("a")
            .output_names(["x"])
            .build()
            .unwrap();
        let b = TaskNode::builder(Work::sync(|_| Ok(Value::Null)))
            .name("b")
            .after(&a)
            .init_kwarg("y", "init")
            .build()
            .unwrap();

        let options = ExecuteOptions::default().pre_call(|_, args| {
            let mut overrides = crate::value::Kwargs::new();
            overrides.insert("y".into(), Value::from("hook"));
            overrides.insert("z".into(), args.kwarg("x").cloned().unwrap_or_default());
            Some(overrides)
        });
        let mut core = RunCore::new(vec![a, b], &options).unwrap();
        core.next_frontier().unwrap();
        core.complete(0, Ok(Value::Int(1))).unwrap();

        let call = core.next_frontier().unwrap().remove(0);
        assert_eq!(call.args.kwarg("x"), Some(&Value::Int(1)));
        assert_eq!(call.args.kwarg("y"), Some(&Value::from("init")));
        assert_eq!(call.args.kwarg("z"), Some(&Value::Int(1)));
    }

    #[test]
    fn node_post_call_overrides_the_default() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let node_seen = Arc::clone(&seen);

        let a = node("a", &[]);
        let b = TaskNode::builder(Work::sync(|_| Ok(Value::Null)))
            .name("b")
            .after(&a)
            .post_call(move |result, deps| {
                node_seen.lock().push(("node", result.clone(), deps.to_vec()));
            })
            .build()
            .unwrap();

        let default_seen = Arc::clone(&seen);
        let options = ExecuteOptions::default().post_call(move |result, deps| {
            default_seen.lock().push(("default", result.clone(), deps.to_vec()));
        });

        let mut core = RunCore::new(vec![a, b], &options).unwrap();
        core.next_frontier().unwrap();
        core.complete(0, Ok(Value::tuple([1, 2]))).unwrap();
        core.next_frontier().unwrap();
        core.complete(1, Ok(Value::Int(3))).unwrap();

        let seen = seen.lock();
        assert_eq!(seen[0], ("default", Value::tuple([1, 2]), vec![]));
        assert_eq!(
            seen[1],
            ("node", Value::Int(3), vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn failure_aborts_when_raising_immediately() {
        let a = node("a", &[]);
        let mut core = RunCore::new(vec![a], &ExecuteOptions::default()).unwrap();
        core.next_frontier().unwrap();

        let err = core.complete(0, Err(anyhow!("boom"))).unwrap_err();
        let failure = err.task_failure().expect("task failure");
        assert_eq!(failure.node(), "a");
        assert_eq!(failure.message(), "boom");
    }

    #[test]
    fn best_effort_stall_without_successes_is_a_deadlock() {
        let a = node("a", &[]);
        let b = node("b", &[&a]);
        let options = ExecuteOptions::default().raise_immediately(false);
        let mut core = RunCore::new(vec![a, b], &options).unwrap();

        core.next_frontier().unwrap();
        core.complete(0, Err(anyhow!("root failed"))).unwrap();
        assert!(core.next_frontier().unwrap().is_empty());
        assert_eq!(core.in_flight(), 0);
        assert!(core.is_active());

        match core.finish() {
            Err(GraphError::PartialFailureDeadlock(partial)) => {
                assert_eq!(partial.len(), 1);
                assert!(partial.failure("a").is_some());
            }
            other => panic!("expected deadlock, got {other:?}"),
        }
    }

    #[test]
    fn ready_indices_defer_the_pre_call_hook() {
        let hooked = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&hooked);
        let options = ExecuteOptions::default().pre_call(move |node, _| {
            seen.lock().push(node.name().to_string());
            None
        });

        let a = node("a", &[]);
        let b = node("b", &[]);
        let mut core = RunCore::new(vec![a, b], &options).unwrap();

        assert_eq!(core.next_ready().unwrap(), vec![0, 1]);
        assert_eq!(core.in_flight(), 2);
        assert!(hooked.lock().is_empty());

        assert_eq!(core.call_for(1).node.name(), "b");
        assert_eq!(*hooked.lock(), ["b"]);
    }

    #[test]
    fn cycles_fail_before_any_call() {
        // Edges resolve by name, so a second "a" that waits on "b" closes
        // the loop a -> b -> a.
        let a = node("a", &[]);
        let b = node("b", &[&a]);
        let a_again = TaskNode::builder(Work::sync(|_| Ok(Value::Null)))
            .name("a")
            .after(&b)
            .build()
            .unwrap();

        let err = RunCore::new(vec![a_again, b], &ExecuteOptions::default()).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }
}
