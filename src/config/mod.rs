// src/config/mod.rs

//! Graph files: declarative graph construction.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a graph file from disk (`loader.rs`).
//! - Validate dependency references and acyclicity (`validate.rs`).
//! - Build a `DependencyGraph` against a `WorkTable` (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::build_graph;
pub use loader::{load_and_validate, load_from_path, load_from_str, parse_and_validate};
pub use model::{GraphFile, GraphSection, RawGraphFile, TaskRecord};
pub use validate::validate_tasks;
