// src/exec/sequential.rs

//! Inline execution, one node at a time on the calling thread.
//!
//! Ready indices wait in a FIFO in the scheduler's emission order. A node's
//! arguments and pre-call hook are only prepared when it reaches the front,
//! right before its body runs.

use std::collections::VecDeque;

use tracing::trace;

use crate::dag::ResultsMap;
use crate::engine::{NodeCall, RunCore};
use crate::errors::Result;

pub fn run(mut core: RunCore) -> Result<ResultsMap> {
    let mut queue = VecDeque::new();

    while core.is_active() {
        queue.extend(core.next_ready()?);
        let Some(index) = queue.pop_front() else {
            break;
        };

        let NodeCall { index, node, args } = core.call_for(index);
        trace!(node = %node.name(), "running node inline");
        let outcome = node.work().call_blocking(args);
        core.complete(index, outcome)?;
    }

    core.finish()
}
