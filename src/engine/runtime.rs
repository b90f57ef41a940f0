// src/engine/runtime.rs

//! Runner selection and run-once caching.
//!
//! Both entry points:
//! - return the cached [`ResultsMap`] if the graph already completed;
//! - claim the graph so that concurrent runs fail with
//!   [`GraphError::AlreadyRunning`];
//! - build a fresh [`RunCore`] (and therefore a fresh scheduler);
//! - cache the results only when the run completed. Aborted or deadlocked
//!   runs leave nothing behind, so the next call retries from scratch.

use tokio::runtime::Handle;
use tokio::task::LocalSet;
use tracing::{debug, info};

use crate::dag::{DependencyGraph, ResultsMap};
use crate::engine::core::RunCore;
use crate::engine::ExecuteOptions;
use crate::errors::{GraphError, Result};
use crate::exec::{cooperative, pooled, process, sequential};
use crate::types::{PoolKind, Strategy};

/// Blocking execution. Cooperative runs get their own current-thread tokio
/// runtime; from inside a runtime they fail with
/// [`GraphError::NestedRuntime`] and should go through
/// [`execute_graph_async`] instead.
pub fn execute_graph(graph: &DependencyGraph, options: &ExecuteOptions) -> Result<ResultsMap> {
    let _guard = graph.begin_run()?;
    if let Some(cached) = cached_results(graph) {
        return Ok(cached);
    }

    let nodes = graph.nodes();
    let strategy = effective_strategy(graph, options.strategy);
    if strategy == Strategy::Cooperative && Handle::try_current().is_ok() {
        return Err(GraphError::NestedRuntime);
    }
    info!(
        graph = ?graph.name(),
        nodes = nodes.len(),
        ?strategy,
        pool = ?options.pool_kind,
        raise_immediately = options.raise_immediately,
        "executing graph"
    );

    let core = RunCore::new(nodes, options)?;
    let results = match (strategy, options.pool_kind) {
        (Strategy::Sequential, _) => sequential::run(core)?,
        (Strategy::Pooled, PoolKind::Threads) => pooled::run(core, options)?,
        (Strategy::Pooled, PoolKind::Processes) => process::run(core, options)?,
        (Strategy::Cooperative, _) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let local = LocalSet::new();
            local.block_on(&runtime, cooperative::run(core, options.semaphore.clone()))?
        }
    };

    graph.store_results(&results);
    Ok(results)
}

/// Execution on the caller's tokio runtime.
///
/// Every strategy runs as cooperative units on the current thread; the
/// pooled settings are ignored here.
pub async fn execute_graph_async(
    graph: &DependencyGraph,
    options: &ExecuteOptions,
) -> Result<ResultsMap> {
    let _guard = graph.begin_run()?;
    if let Some(cached) = cached_results(graph) {
        return Ok(cached);
    }

    let nodes = graph.nodes();
    info!(graph = ?graph.name(), nodes = nodes.len(), "executing graph on the current runtime");

    let core = RunCore::new(nodes, options)?;
    let results = LocalSet::new()
        .run_until(cooperative::run(core, options.semaphore.clone()))
        .await?;

    graph.store_results(&results);
    Ok(results)
}

fn cached_results(graph: &DependencyGraph) -> Option<ResultsMap> {
    let cached = graph.results()?;
    debug!(graph = ?graph.name(), entries = cached.len(), "returning cached results");
    Some(cached)
}

/// Async graphs always run cooperatively, whatever was requested.
fn effective_strategy(graph: &DependencyGraph, requested: Strategy) -> Strategy {
    if graph.is_async() && requested != Strategy::Cooperative {
        debug!(?requested, "graph contains async work; using the cooperative runner");
        return Strategy::Cooperative;
    }
    requested
}
