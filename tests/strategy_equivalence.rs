// tests/strategy_equivalence.rs

mod common;
use crate::common::node;

use std::collections::BTreeSet;

use proptest::prelude::*;
use taskgraph::{
    DependencyGraph, ExecuteOptions, GraphError, PoolKind, ResultsMap, SchedulerKind, TaskNode,
    Value, Work,
};

/// Dependency lists for a random DAG. Task `i` may only depend on tasks
/// `0..i`, so every generated graph is acyclic.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), num_tasks)
            .prop_map(|raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        let deps: BTreeSet<usize> = if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        };
                        deps.into_iter().collect()
                    })
                    .collect()
            })
    })
}

/// Task `i` returns `i` plus the sum of its inputs, or fails if listed in
/// `failing`.
fn build(deps: &[Vec<usize>], failing: &BTreeSet<usize>) -> Result<DependencyGraph, GraphError> {
    let mut nodes: Vec<TaskNode> = Vec::with_capacity(deps.len());
    for (i, task_deps) in deps.iter().enumerate() {
        let work = if failing.contains(&i) {
            Work::sync(move |_| anyhow::bail!("task {i} failed"))
        } else {
            Work::sync(move |args| {
                let inputs: i64 = args.values().filter_map(Value::as_i64).sum();
                Ok(Value::Int(i as i64 + inputs))
            })
        };
        let dep_nodes: Vec<&TaskNode> = task_deps.iter().map(|d| &nodes[*d]).collect();
        let task = node(&format!("task_{i:02}"), work, &dep_nodes);
        nodes.push(task);
    }
    DependencyGraph::new(nodes)
}

fn variants() -> Vec<(&'static str, ExecuteOptions)> {
    vec![
        ("sequential", ExecuteOptions::default()),
        (
            "threads",
            ExecuteOptions::default()
                .strategy(taskgraph::Strategy::Pooled)
                .pool_kind(PoolKind::Threads)
                .worker_count(4),
        ),
        (
            "cooperative",
            ExecuteOptions::default().strategy(taskgraph::Strategy::Cooperative),
        ),
        (
            "cooperative-bounded",
            ExecuteOptions::default()
                .strategy(taskgraph::Strategy::Cooperative)
                .max_concurrency(2),
        ),
        (
            "kahn",
            ExecuteOptions::default().scheduler(SchedulerKind::Kahn),
        ),
        (
            "petgraph",
            ExecuteOptions::default().scheduler(SchedulerKind::Petgraph),
        ),
    ]
}

/// Either the completed map or the partial map carried by a deadlock.
fn outcome(result: Result<ResultsMap, GraphError>) -> Result<(bool, ResultsMap), String> {
    match result {
        Ok(results) => Ok((false, results)),
        Err(GraphError::PartialFailureDeadlock(partial)) => Ok((true, partial)),
        Err(other) => Err(other.to_string()),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_runner_produces_the_same_results(deps in dag_strategy(10)) {
        let mut reference: Option<ResultsMap> = None;

        for (label, options) in variants() {
            let graph = build(&deps, &BTreeSet::new()).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let results = graph
                .execute(&options)
                .map_err(|e| TestCaseError::fail(format!("{label}: {e}")))?;

            prop_assert_eq!(results.len(), deps.len(), "{}", label);
            prop_assert!(!results.has_failures(), "{}", label);
            let expected = reference.get_or_insert_with(|| results.clone());
            prop_assert_eq!(&results, &*expected, "{}", label);
        }
    }

    #[test]
    fn best_effort_runs_agree_on_failures(
        deps in dag_strategy(10),
        picks in proptest::collection::vec(any::<usize>(), 1..3),
    ) {
        let failing: BTreeSet<usize> = picks.into_iter().map(|p| p % deps.len()).collect();
        let mut reference: Option<(bool, ResultsMap)> = None;

        for (label, options) in variants() {
            let graph = build(&deps, &failing).map_err(|e| TestCaseError::fail(e.to_string()))?;
            let observed = outcome(graph.execute(&options.raise_immediately(false)))
                .map_err(|e| TestCaseError::fail(format!("{label}: {e}")))?;

            // A failing task either recorded its failure or was blocked by
            // an upstream one.
            let (_, results) = &observed;
            for &f in &failing {
                let name = format!("task_{f:02}");
                if results.contains(name.as_str()) {
                    prop_assert!(results.failure(name.as_str()).is_some(), "{}", label);
                }
            }
            let expected = reference.get_or_insert_with(|| observed.clone());
            prop_assert_eq!(&observed, &*expected, "{}", label);
        }
    }
}
