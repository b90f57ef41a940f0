#![allow(dead_code)]

pub use taskgraph_test_utils::builders;
pub use taskgraph_test_utils::recorder::{CallRecorder, ConcurrencyProbe};
pub use taskgraph_test_utils::{init_tracing, with_timeout};

use taskgraph::{ExecuteOptions, PoolKind, Strategy, TaskNode, Work};

/// Build a named node depending on `deps`, in order.
pub fn node(name: &str, work: Work, deps: &[&TaskNode]) -> TaskNode {
    TaskNode::builder(work)
        .name(name)
        .after_all(deps.iter().map(|d| (*d).clone()))
        .build()
        .expect("node builds")
}

/// Every blocking strategy, with small pools.
pub fn blocking_strategies() -> Vec<(&'static str, ExecuteOptions)> {
    vec![
        ("sequential", ExecuteOptions::default()),
        (
            "threads",
            ExecuteOptions::default()
                .strategy(Strategy::Pooled)
                .pool_kind(PoolKind::Threads)
                .worker_count(3),
        ),
        (
            "cooperative",
            ExecuteOptions::default().strategy(Strategy::Cooperative),
        ),
    ]
}
