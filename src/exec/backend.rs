// src/exec/backend.rs

//! Pluggable backend abstraction for the blocking runners.
//!
//! The thread and process pool runners share one driver loop ([`drive`]) and
//! differ only in how a single [`NodeCall`] is executed. `ThreadPoolBackend`
//! and `ProcessPoolBackend` both submit calls to workers and block on a
//! channel for exactly one completion.
//!
//! Tests can provide their own backend to script completion order.

use tracing::{debug, warn};

use crate::dag::ResultsMap;
use crate::engine::{NodeCall, RunCore};
use crate::errors::Result;
use crate::value::Value;

/// Outcome of one dispatched call.
#[derive(Debug)]
pub struct Completion {
    pub index: usize,
    pub outcome: anyhow::Result<Value>,
}

/// How dispatched calls are executed.
pub trait Backend {
    /// Hand one call to the backend. Must not block on its execution.
    fn submit(&mut self, call: NodeCall) -> Result<()>;

    /// Block until exactly one submitted call has completed.
    fn next_completion(&mut self) -> Result<Completion>;

    /// Drop submitted calls that have not started yet. Calls already running
    /// are left to finish and their completions are discarded.
    fn abort(&mut self) {}
}

/// Run `core` to completion on `backend`.
///
/// Submission and completion interleave: after every completion readiness
/// is re-queried and newly eligible nodes are submitted without waiting for
/// the rest of the current frontier.
pub fn drive<B: Backend + ?Sized>(mut core: RunCore, backend: &mut B) -> Result<ResultsMap> {
    while core.is_active() {
        for call in core.next_frontier()? {
            if let Err(err) = backend.submit(call) {
                backend.abort();
                return Err(err);
            }
        }

        if core.in_flight() == 0 {
            debug!("nothing in flight and nothing eligible; stopping");
            break;
        }

        let completion = match backend.next_completion() {
            Ok(completion) => completion,
            Err(err) => {
                backend.abort();
                return Err(err);
            }
        };

        if let Err(err) = core.complete(completion.index, completion.outcome) {
            warn!(in_flight = core.in_flight(), "run aborted; cancelling pending calls");
            backend.abort();
            return Err(err);
        }
    }

    core.finish()
}
