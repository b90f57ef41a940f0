// src/engine/mod.rs

//! Orchestration engine.
//!
//! One run algorithm, three ways of executing a ready node:
//! - the pure bookkeeping lives in [`core`] (`RunCore`): frontier
//!   computation, eligibility filtering, argument assembly, hooks and
//!   result recording;
//! - [`runtime`] picks a runner for a graph and owns run-once caching;
//! - the per-strategy mechanics (inline, pool submission, spawned unit)
//!   live in [`crate::exec`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::dag::node::{PostCall, PreCall, TaskNode};
use crate::types::{PoolKind, SchedulerKind, Strategy};
use crate::value::{Args, Kwargs, Value};

pub mod arguments;
pub mod core;
pub mod runtime;

pub use self::core::{NodeCall, RunCore};
pub use runtime::{execute_graph, execute_graph_async};

/// Options for one `execute` call.
///
/// Built with [`ExecuteOptions::default`] plus the chained setters:
///
/// ```no_run
/// # use taskgraph::engine::ExecuteOptions;
/// # use taskgraph::types::Strategy;
/// let options = ExecuteOptions::default()
///     .strategy(Strategy::Pooled)
///     .worker_count(4)
///     .raise_immediately(false);
/// ```
#[derive(Clone)]
pub struct ExecuteOptions {
    /// Default `pre_call` for nodes without their own.
    pub pre_call: Option<PreCall>,
    /// Default `post_call` for nodes without their own.
    pub post_call: Option<PostCall>,
    /// Abort on the first task failure (default) instead of recording it.
    pub raise_immediately: bool,
    pub strategy: Strategy,
    pub pool_kind: PoolKind,
    /// Worker threads or processes for the pooled strategy.
    pub worker_count: usize,
    /// Caller-owned rayon pool; takes precedence over `worker_count` for
    /// thread pools.
    pub thread_pool: Option<Arc<rayon::ThreadPool>>,
    /// Program spawned by the process pool; defaults to the current
    /// executable.
    pub worker_program: Option<std::path::PathBuf>,
    /// Bounds concurrently running units under the cooperative runner.
    pub semaphore: Option<Arc<Semaphore>>,
    pub scheduler: SchedulerKind,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            pre_call: None,
            post_call: None,
            raise_immediately: true,
            strategy: Strategy::default(),
            pool_kind: PoolKind::default(),
            worker_count: default_worker_count(),
            thread_pool: None,
            worker_program: None,
            semaphore: None,
            scheduler: SchedulerKind::from_env(),
        }
    }
}

impl ExecuteOptions {
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn pool_kind(mut self, kind: PoolKind) -> Self {
        self.pool_kind = kind;
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn thread_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.thread_pool = Some(pool);
        self
    }

    pub fn worker_program(mut self, program: impl Into<std::path::PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn raise_immediately(mut self, raise: bool) -> Self {
        self.raise_immediately = raise;
        self
    }

    pub fn semaphore(mut self, semaphore: Arc<Semaphore>) -> Self {
        self.semaphore = Some(semaphore);
        self
    }

    /// Shorthand for a fresh semaphore with `permits` permits.
    pub fn max_concurrency(self, permits: usize) -> Self {
        self.semaphore(Arc::new(Semaphore::new(permits.max(1))))
    }

    pub fn scheduler(mut self, kind: SchedulerKind) -> Self {
        self.scheduler = kind;
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
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("pre_call", &self.pre_call.is_some())
            .field("post_call", &self.post_call.is_some())
            .field("raise_immediately", &self.raise_immediately)
            .field("strategy", &self.strategy)
            .field("pool_kind", &self.pool_kind)
            .field("worker_count", &self.worker_count)
            .field("thread_pool", &self.thread_pool.is_some())
            .field("worker_program", &self.worker_program)
            .field("semaphore", &self.semaphore.is_some())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
