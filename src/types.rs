use std::str::FromStr;

use clap::ValueEnum;
use serde::Deserialize;

/// Environment variable consulted by [`SchedulerKind::from_env`].
pub const SCHEDULER_ENV: &str = "TASKGRAPH_SCHEDULER";

/// How ready nodes are executed.
///
/// - `Sequential`: one node at a time on the calling thread.
/// - `Pooled`: nodes are submitted to a worker pool (threads or processes)
///   as soon as they become eligible.
/// - `Cooperative`: nodes run as units on a single-threaded tokio runtime.
///   Graphs containing async work always use this strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sequential,
    Pooled,
    Cooperative,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Sequential
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(Strategy::Sequential),
            "pooled" => Ok(Strategy::Pooled),
            "cooperative" => Ok(Strategy::Cooperative),
            other => Err(format!(
                "invalid strategy: {other} (expected \"sequential\", \"pooled\" or \"cooperative\")"
            )),
        }
    }
}

/// Kind of worker pool used by the pooled strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// A rayon thread pool inside the current process.
    Threads,
    /// Child processes running the worker program; work must come from a
    /// [`WorkTable`](crate::work::WorkTable) so it can be referenced by key.
    Processes,
}

impl Default for PoolKind {
    fn default() -> Self {
        PoolKind::Threads
    }
}

impl FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "threads" | "thread" => Ok(PoolKind::Threads),
            "processes" | "process" => Ok(PoolKind::Processes),
            other => Err(format!(
                "invalid pool kind: {other} (expected \"threads\" or \"processes\")"
            )),
        }
    }
}

/// Which topological scheduler implementation drives a run.
///
/// Both implementations emit identical frontiers; they differ only in how
/// the graph is stored and checked for cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// Reference Kahn's-algorithm implementation over plain vectors.
    Kahn,
    /// `petgraph`-backed implementation.
    Petgraph,
}

impl Default for SchedulerKind {
    fn default() -> Self {
        SchedulerKind::Petgraph
    }
}

impl SchedulerKind {
    /// Resolve the scheduler from `TASKGRAPH_SCHEDULER`, falling back to the
    /// default when the variable is unset or unparsable.
    pub fn from_env() -> Self {
        std::env::var(SCHEDULER_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kahn" | "reference" => Ok(SchedulerKind::Kahn),
            "petgraph" | "native" => Ok(SchedulerKind::Petgraph),
            other => Err(format!(
                "invalid scheduler: {other} (expected \"kahn\" or \"petgraph\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(" Pooled ".parse::<Strategy>(), Ok(Strategy::Pooled));
        assert_eq!("process".parse::<PoolKind>(), Ok(PoolKind::Processes));
        assert_eq!("reference".parse::<SchedulerKind>(), Ok(SchedulerKind::Kahn));
        assert!("parallel".parse::<Strategy>().is_err());
    }
}
