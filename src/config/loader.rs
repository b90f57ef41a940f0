// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{GraphFile, RawGraphFile};
use crate::errors::Result;

/// Load a graph file from a given path and return the raw `RawGraphFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (dependency references, cycles). Use [`load_and_validate`] for
/// that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawGraphFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

/// Parse a graph file from TOML text without validating it.
pub fn load_from_str(contents: &str) -> Result<RawGraphFile> {
    let raw: RawGraphFile = toml::from_str(contents)?;
    Ok(raw)
}

/// Load a graph file from path and run validation.
///
/// This is the recommended entry point:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - an empty task list,
///   - unknown `after` references,
///   - cycles (including self-dependencies),
///   - `[graph]` sanity (`workers`, `max_concurrency`).
///
/// Work references are only checked when the graph is built against a
/// [`WorkTable`](crate::work::WorkTable).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<GraphFile> {
    let raw = load_from_path(path)?;
    GraphFile::try_from(raw)
}

/// [`load_and_validate`] for TOML text.
pub fn parse_and_validate(contents: &str) -> Result<GraphFile> {
    GraphFile::try_from(load_from_str(contents)?)
}
