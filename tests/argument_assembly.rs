// tests/argument_assembly.rs

mod common;
use crate::common::{init_tracing, node};

use std::error::Error;
use std::sync::{Arc, Mutex};

use taskgraph::{Args, DependencyGraph, ExecuteOptions, Kwargs, TaskNode, Value, Work};

type TestResult = Result<(), Box<dyn Error>>;

/// Work that stores the arguments it was called with and returns `result`.
fn capturing(slot: &Arc<Mutex<Option<Args>>>, result: Value) -> Work {
    let slot = Arc::clone(slot);
    Work::sync(move |args| {
        *slot.lock().unwrap() = Some(args);
        Ok(result.clone())
    })
}

#[test]
fn named_tuple_outputs_arrive_as_keywords() -> TestResult {
    init_tracing();

    let a = TaskNode::builder(Work::sync(|_| Ok(Value::tuple([1, 2]))))
        .name("A")
        .output_names(["x", "y"])
        .build()?;
    let b = node(
        "B",
        Work::sync(|args| Ok(Value::Int(args.kw_int("x")? * 10 + args.kw_int("y")?))),
        &[&a],
    );

    let graph = DependencyGraph::new([b.clone()])?;
    let results = graph.execute(&ExecuteOptions::default())?;

    assert_eq!(results.value(&b), Some(&Value::Int(12)));
    Ok(())
}

#[test]
fn unnamed_tuple_outputs_arrive_positionally() -> TestResult {
    init_tracing();

    let a = node("A", Work::sync(|_| Ok(Value::tuple([1, 2]))), &[]);
    let b = node(
        "B",
        Work::sync(|args| {
            assert_eq!(args.positional.len(), 2);
            Ok(Value::Int(args.int(0)? - args.int(1)?))
        }),
        &[&a],
    );

    let graph = DependencyGraph::new([b.clone()])?;
    let results = graph.execute(&ExecuteOptions::default())?;

    assert_eq!(results.value("B"), Some(&Value::Int(-1)));
    Ok(())
}

#[test]
fn positionals_follow_dependency_order() -> TestResult {
    let seen = Arc::new(Mutex::new(None));

    let first = node("first", Work::sync(|_| Ok(Value::from("one"))), &[]);
    let pair = node("pair", Work::sync(|_| Ok(Value::tuple(["two", "three"]))), &[]);
    let list = node(
        "list",
        Work::sync(|_| Ok(Value::List(vec![Value::Int(4)]))),
        &[],
    );
    let sink = node(
        "sink",
        capturing(&seen, Value::Null),
        &[&pair, &first, &list],
    );

    DependencyGraph::new([sink])?.execute(&ExecuteOptions::default())?;

    let args = seen.lock().unwrap().take().expect("sink ran");
    assert_eq!(
        args.positional,
        vec![
            Value::from("two"),
            Value::from("three"),
            Value::from("one"),
            Value::List(vec![Value::Int(4)]),
        ]
    );
    Ok(())
}

#[test]
fn init_kwargs_win_over_pre_call_and_dependencies() -> TestResult {
    let seen = Arc::new(Mutex::new(None));

    let a = TaskNode::builder(Work::sync(|_| Ok(Value::Int(1))))
        .name("a")
        .output_names(["shared"])
        .build()?;
    let b = TaskNode::builder(capturing(&seen, Value::Null))
        .name("b")
        .after(&a)
        .pre_call(|_, _| {
            let mut overrides = Kwargs::new();
            overrides.insert("shared".to_string(), Value::Int(2));
            overrides.insert("from_hook".to_string(), Value::Bool(true));
            Some(overrides)
        })
        .init_kwarg("shared", 3)
        .build()?;

    DependencyGraph::new([b])?.execute(&ExecuteOptions::default())?;

    let args = seen.lock().unwrap().take().expect("b ran");
    assert_eq!(args.kwarg("shared"), Some(&Value::Int(3)));
    assert_eq!(args.kwarg("from_hook"), Some(&Value::Bool(true)));
    Ok(())
}

#[test]
fn node_pre_call_overrides_the_runner_default() -> TestResult {
    let seen = Arc::new(Mutex::new(None));

    let a = TaskNode::builder(capturing(&seen, Value::Null))
        .name("a")
        .pre_call(|node, _| {
            let mut overrides = Kwargs::new();
            overrides.insert("who".to_string(), Value::from(format!("node:{}", node.name())));
            Some(overrides)
        })
        .build()?;

    let options = ExecuteOptions::default().pre_call(|_, _| {
        let mut overrides = Kwargs::new();
        overrides.insert("who".to_string(), Value::from("default"));
        Some(overrides)
    });
    DependencyGraph::new([a])?.execute(&options)?;

    let args = seen.lock().unwrap().take().expect("a ran");
    assert_eq!(args.kwarg("who"), Some(&Value::from("node:a")));
    Ok(())
}

#[test]
fn post_call_sees_result_and_flattened_dependency_results() -> TestResult {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);

    let a = node("a", Work::sync(|_| Ok(Value::tuple([1, 2]))), &[]);
    let b = node("b", Work::sync(|_| Ok(Value::Int(3))), &[]);
    let c = node(
        "c",
        Work::sync(|args| Ok(Value::Int(args.values().filter_map(Value::as_i64).sum()))),
        &[&a, &b],
    );

    let options = ExecuteOptions::default().post_call(move |result, deps| {
        sink.lock().unwrap().push((result.clone(), deps.to_vec()));
    });
    DependencyGraph::new([c])?.execute(&options)?;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    let (result, deps) = calls.last().expect("c's post_call ran last");
    assert_eq!(result, &Value::Int(6));
    assert_eq!(deps, &vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    Ok(())
}

#[test]
fn sequential_pre_call_runs_right_before_each_body() -> TestResult {
    let log = Arc::new(Mutex::new(Vec::new()));

    let body = |name: &str| {
        let log = Arc::clone(&log);
        let entry = format!("body:{name}");
        Work::sync(move |_| {
            log.lock().unwrap().push(entry.clone());
            Ok(Value::Null)
        })
    };
    let a = node("a", body("a"), &[]);
    let b = node("b", body("b"), &[]);
    let c = node("c", body("c"), &[&a, &b]);

    let hook_log = Arc::clone(&log);
    let options = ExecuteOptions::default().pre_call(move |node, _| {
        hook_log.lock().unwrap().push(format!("hook:{}", node.name()));
        None
    });
    DependencyGraph::new([a, b, c])?.execute(&options)?;

    assert_eq!(
        *log.lock().unwrap(),
        ["hook:a", "body:a", "hook:b", "body:b", "hook:c", "body:c"]
    );
    Ok(())
}
