// src/exec/cooperative.rs

//! Cooperative execution on a single-threaded tokio runtime.
//!
//! Each eligible node becomes a unit spawned on the current `LocalSet`. A
//! unit optionally waits for a semaphore permit, awaits the node's work and
//! pushes its [`Completion`] onto an unbounded queue. The orchestrating loop
//! awaits exactly one queue item at a time. When the run aborts, units that
//! are still outstanding are abandoned together with the `LocalSet`.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, trace, warn};

use crate::dag::ResultsMap;
use crate::engine::{NodeCall, RunCore};
use crate::errors::{GraphError, Result};
use crate::exec::backend::Completion;
use crate::work::panic_message;

/// Drive `core` to completion. Must be polled inside a
/// [`tokio::task::LocalSet`].
pub async fn run(mut core: RunCore, semaphore: Option<Arc<Semaphore>>) -> Result<ResultsMap> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();

    while core.is_active() {
        for call in core.next_frontier()? {
            spawn_unit(call, semaphore.clone(), tx.clone());
        }

        if core.in_flight() == 0 {
            debug!("nothing in flight and nothing eligible; stopping");
            break;
        }

        let completion = rx
            .recv()
            .await
            .ok_or_else(|| GraphError::Scheduler("completion queue closed".to_string()))?;

        if let Err(err) = core.complete(completion.index, completion.outcome) {
            warn!(
                abandoned = core.in_flight(),
                "run aborted; abandoning outstanding units"
            );
            return Err(err);
        }
    }

    core.finish()
}

fn spawn_unit(
    call: NodeCall,
    semaphore: Option<Arc<Semaphore>>,
    tx: mpsc::UnboundedSender<Completion>,
) {
    tokio::task::spawn_local(async move {
        let NodeCall { index, node, args } = call;

        // A closed semaphore means no limit.
        let _permit = match semaphore {
            Some(semaphore) => semaphore.acquire_owned().await.ok(),
            None => None,
        };

        trace!(node = %node.name(), "unit started");
        let body = node.work().to_future(args);

        // Run the body as its own task so a panic surfaces as a JoinError
        // instead of silently killing this unit.
        let outcome = match tokio::task::spawn_local(body).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => {
                let payload = err.into_panic();
                Err(anyhow!("task panicked: {}", panic_message(payload.as_ref())))
            }
            Err(err) => Err(anyhow!("task was cancelled: {err}")),
        };

        // The receiver is gone once the run has been aborted.
        let _ = tx.send(Completion { index, outcome });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::dag::TaskNode;
    use crate::engine::ExecuteOptions;
    use crate::value::Value;
    use crate::work::Work;

    fn run_blocking(core: RunCore) -> Result<ResultsMap> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        tokio::task::LocalSet::new().block_on(&runtime, run(core, None))
    }

    #[test]
    fn mixes_sync_and_async_work() {
        let a = TaskNode::builder(Work::from_async(|_| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Value::Int(2))
        }))
        .name("a")
        .build()
        .unwrap();
        let b = TaskNode::builder(Work::sync(|args| Ok(Value::Int(args.int(0)? * 10))))
            .name("b")
            .after(&a)
            .build()
            .unwrap();

        let core = RunCore::new(vec![a, b], &ExecuteOptions::default()).unwrap();
        let results = run_blocking(core).unwrap();
        assert_eq!(results.value("b"), Some(&Value::Int(20)));
    }

    #[test]
    fn panics_become_failures() {
        let boom = TaskNode::builder(Work::from_async(|_| async {
            let missing: Option<Value> = None;
            Ok(missing.expect("async boom"))
        }))
        .name("boom")
        .build()
        .unwrap();

        let options = ExecuteOptions::default().raise_immediately(false);
        let core = RunCore::new(vec![boom], &options).unwrap();
        let results = run_blocking(core).unwrap();

        let failure = results.failure("boom").expect("recorded failure");
        assert!(failure.message().contains("async boom"));
    }
}
