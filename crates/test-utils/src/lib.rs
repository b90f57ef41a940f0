//! Shared helpers for the `taskgraph` integration tests.
//!
//! - [`builders`]: graph file and task record builders.
//! - [`recorder`]: work items that count their calls or measure overlap.

pub mod builders;
pub mod recorder;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use taskgraph::logging::LOG_ENV;
use tracing_subscriber::{fmt, EnvFilter};

static TRACING: Once = Once::new();

/// Upper bound for async tests awaiting a whole graph run.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Install a test subscriber once per test binary.
///
/// Output goes through the test writer, so it only shows up for failing
/// tests or with `--nocapture`. The filter is read from `TASKGRAPH_LOG`
/// (e.g. `TASKGRAPH_LOG=taskgraph::engine=debug`) and defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_names(true)
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("graph run did not finish within {TEST_TIMEOUT:?}"),
    }
}
