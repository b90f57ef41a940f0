// src/exec/pooled.rs

//! Thread pool execution on rayon.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, trace};

use crate::dag::ResultsMap;
use crate::engine::{ExecuteOptions, NodeCall, RunCore};
use crate::errors::{GraphError, Result};
use crate::exec::backend::{drive, Backend, Completion};

/// Submits each call as a rayon job; jobs report back on a crossbeam
/// channel.
pub struct ThreadPoolBackend {
    pool: Arc<rayon::ThreadPool>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    /// Set on abort; queued jobs check it before running.
    cancelled: Arc<AtomicBool>,
}

impl ThreadPoolBackend {
    /// Use the caller's pool if one is given, otherwise build a pool with
    /// `worker_count` threads.
    pub fn new(options: &ExecuteOptions) -> Result<Self> {
        let pool = match &options.thread_pool {
            Some(pool) => Arc::clone(pool),
            None => {
                let threads = options.worker_count.max(1);
                debug!(threads, "building worker thread pool");
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("taskgraph-worker-{i}"))
                    .build()
                    .map_err(|e| GraphError::Pool(format!("failed to build thread pool: {e}")))?;
                Arc::new(pool)
            }
        };

        let (completions_tx, completions_rx) = channel::unbounded();
        Ok(Self {
            pool,
            completions_tx,
            completions_rx,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Backend for ThreadPoolBackend {
    fn submit(&mut self, call: NodeCall) -> Result<()> {
        let tx = self.completions_tx.clone();
        let cancelled = Arc::clone(&self.cancelled);

        self.pool.spawn(move || {
            let NodeCall { index, node, args } = call;
            if cancelled.load(Ordering::SeqCst) {
                trace!(node = %node.name(), "skipping cancelled call");
                return;
            }
            let outcome = node.work().call_blocking(args);
            // The receiver is gone once the run has been aborted.
            let _ = tx.send(Completion { index, outcome });
        });
        Ok(())
    }

    fn next_completion(&mut self) -> Result<Completion> {
        self.completions_rx
            .recv()
            .map_err(|_| GraphError::Pool("completion channel closed".to_string()))
    }

    fn abort(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for ThreadPoolBackend {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

pub fn run(core: RunCore, options: &ExecuteOptions) -> Result<ResultsMap> {
    let mut backend = ThreadPoolBackend::new(options)?;
    drive(core, &mut backend)
}
