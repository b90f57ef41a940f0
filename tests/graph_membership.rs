// tests/graph_membership.rs

mod common;
use crate::common::node;

use std::collections::BTreeMap;
use std::error::Error;

use taskgraph::{DependencyGraph, ExecuteOptions, GraphError, GraphRegistry, TaskNode, Value, Work};

type TestResult = Result<(), Box<dyn Error>>;

fn constant(value: i64) -> Work {
    Work::sync(move |_| Ok(Value::Int(value)))
}

#[test]
fn combining_two_loose_nodes_creates_a_graph() -> TestResult {
    let a = node("a", constant(1), &[]);
    let b = node("b", constant(2), &[]);

    let graph = DependencyGraph::combine(&a, &b)?;

    assert_eq!(graph.len(), 2);
    assert!(a.graph().is_some_and(|g| g.ptr_eq(&graph)));
    assert!(b.graph().is_some_and(|g| g.ptr_eq(&graph)));
    Ok(())
}

#[test]
fn combining_with_a_graph_member_joins_that_graph() -> TestResult {
    let a = node("a", constant(1), &[]);
    let graph = DependencyGraph::new([a.clone()])?;

    let b = node("b", constant(2), &[]);
    let joined = DependencyGraph::combine(&graph, &b)?;
    assert!(joined.ptr_eq(&graph));

    let c = node("c", constant(3), &[]);
    let joined = DependencyGraph::combine(&c, &a)?;
    assert!(joined.ptr_eq(&graph));

    assert_eq!(graph.len(), 3);
    Ok(())
}

#[test]
fn combining_members_of_different_graphs_conflicts() -> TestResult {
    let a = node("a", constant(1), &[]);
    let b = node("b", constant(2), &[]);
    let first = DependencyGraph::new([a.clone()])?;
    let second = DependencyGraph::new([b.clone()])?;

    let err = DependencyGraph::combine(&a, &b).expect_err("two graphs");
    assert!(matches!(err, GraphError::GraphConflict(_)));

    assert!(matches!(
        second.add(&a),
        Err(GraphError::GraphConflict(_))
    ));
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    Ok(())
}

#[test]
fn building_after_a_member_joins_its_graph() -> TestResult {
    let a = node("a", constant(1), &[]);
    let graph = DependencyGraph::new([a.clone()])?;

    let b = node(
        "b",
        Work::sync(|args| Ok(Value::Int(args.int(0)? + 1))),
        &[&a],
    );

    assert!(graph.contains(&b));
    let results = graph.execute(&ExecuteOptions::default())?;
    assert_eq!(results.value(&b), Some(&Value::Int(2)));
    Ok(())
}

#[test]
fn building_after_members_of_two_graphs_conflicts() -> TestResult {
    let a = node("a", constant(1), &[]);
    let b = node("b", constant(2), &[]);
    let _first = DependencyGraph::new([a.clone()])?;
    let _second = DependencyGraph::new([b.clone()])?;

    let err = TaskNode::builder(constant(3))
        .name("c")
        .after_all(a.and(&b))
        .build()
        .expect_err("dependencies in two graphs");
    assert!(matches!(err, GraphError::GraphConflict(_)));
    Ok(())
}

#[test]
fn duplicate_names_are_rejected_without_side_effects() -> TestResult {
    let first = node("twin", constant(1), &[]);
    let graph = DependencyGraph::new([first])?;

    let loose = node("loose", constant(2), &[]);
    let second = node("twin", constant(3), &[&loose]);

    let err = graph.add(&second).expect_err("same name");
    assert!(matches!(err, GraphError::DuplicateName(name) if name == "twin"));

    assert_eq!(graph.len(), 1);
    assert!(loose.graph().is_none(), "partial closure must not be attached");
    assert!(second.graph().is_none());
    Ok(())
}

#[test]
fn adding_a_member_again_is_a_no_op() -> TestResult {
    let a = node("a", constant(1), &[]);
    let graph = DependencyGraph::new([a.clone()])?;
    graph.execute(&ExecuteOptions::default())?;

    graph.add(&a)?;
    assert_eq!(graph.len(), 1);
    assert!(graph.results().is_some(), "cache survives a no-op add");
    Ok(())
}

#[test]
fn dropping_the_last_handle_detaches_members() -> TestResult {
    let a = node("a", constant(1), &[]);
    {
        let graph = DependencyGraph::new([a.clone()])?;
        let also = graph.clone();
        drop(graph);
        assert!(a.graph().is_some_and(|g| g.ptr_eq(&also)));
    }
    assert!(a.graph().is_none());

    // A detached node can join a new graph.
    let fresh = DependencyGraph::new([a.clone()])?;
    assert!(fresh.contains(&a));
    Ok(())
}

#[test]
fn lookups_reflect_membership_and_dependencies() -> TestResult {
    let a = node("a", constant(1), &[]);
    let b = node("b", constant(2), &[]);
    let c = node("c", constant(3), &[&a, &b]);
    let graph = DependencyGraph::named("lookups", [c.clone()])?;

    assert_eq!(graph.name(), Some("lookups"));
    assert!(graph.node("c").is_some_and(|n| n.ptr_eq(&c)));
    assert!(graph.node("missing").is_none());

    let expected: BTreeMap<String, Vec<String>> = [
        ("a".to_string(), vec![]),
        ("b".to_string(), vec![]),
        ("c".to_string(), vec!["a".to_string(), "b".to_string()]),
    ]
    .into_iter()
    .collect();
    assert_eq!(graph.unsorted(), expected);
    assert!(!graph.is_async());
    Ok(())
}

#[test]
fn registry_tracks_named_graphs_until_disposed() -> TestResult {
    let registry = GraphRegistry::new();

    let a = node("a", constant(1), &[]);
    let graph = DependencyGraph::named("nightly", [a.clone()])?;
    registry.register(&graph)?;

    let unnamed = DependencyGraph::new([node("b", constant(2), &[])])?;
    assert!(matches!(
        registry.register(&unnamed),
        Err(GraphError::UnnamedGraph)
    ));

    // The registry keeps the graph alive on its own.
    drop(graph);
    let found = registry.lookup("nightly").ok_or("registered graph")?;
    assert!(a.graph().is_some());
    assert_eq!(registry.names(), vec!["nightly".to_string()]);

    found.dispose();
    assert!(!registry.contains("nightly"));
    assert!(registry.is_empty());
    assert!(a.graph().is_none());
    assert!(found.is_empty());
    Ok(())
}

#[test]
fn unregister_leaves_the_graph_usable() -> TestResult {
    let registry = GraphRegistry::new();
    let graph = DependencyGraph::named("adhoc", [node("a", constant(7), &[])])?;
    registry.register(&graph)?;

    let removed = registry.unregister("adhoc").ok_or("entry existed")?;
    assert!(removed.ptr_eq(&graph));
    assert!(registry.lookup("adhoc").is_none());

    let results = graph.execute(&ExecuteOptions::default())?;
    assert_eq!(results.value("a"), Some(&Value::Int(7)));
    Ok(())
}
