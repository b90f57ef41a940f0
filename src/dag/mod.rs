// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`node`] defines [`TaskNode`], the unit callers build graphs from.
//! - [`dependency_graph`] owns a member set, run-once caching and the
//!   `execute` entry points.
//! - [`registry`] is an explicit name -> graph registry.
//! - [`graph`] is the index-based topology snapshot used during a run.
//! - [`scheduler`] contains the incremental ready-set trackers.
//! - [`results`] holds the per-node outcomes of a run.

pub mod dependency_graph;
pub mod graph;
pub mod node;
pub mod registry;
pub mod results;
pub mod scheduler;

pub use dependency_graph::{DependencyGraph, GraphPart};
pub use graph::DagTopology;
pub use node::{PostCall, PreCall, TaskNode, TaskNodeBuilder};
pub use registry::GraphRegistry;
pub use results::{Outcome, ResultKey, ResultsMap};
pub use scheduler::{create_scheduler, KahnScheduler, PetgraphScheduler, TopologicalScheduler};
