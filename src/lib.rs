// src/lib.rs

pub mod builtins;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;
pub mod value;
pub mod work;

pub use dag::{DependencyGraph, GraphRegistry, ResultsMap, TaskNode};
pub use engine::ExecuteOptions;
pub use errors::{GraphError, TaskFailure};
pub use types::{PoolKind, SchedulerKind, Strategy};
pub use value::{Args, Kwargs, Value};
pub use work::{Work, WorkTable};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::builtins::builtin_table;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::GraphFile;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - graph file loading and validation
/// - graph construction against the builtin work table
/// - run options from `[graph]`, overridden by CLI flags
/// - printing the results as JSON on stdout
pub fn run(args: CliArgs) -> Result<()> {
    let file = load_and_validate(&args.config)
        .with_context(|| format!("loading graph file '{}'", args.config))?;

    if args.dry_run {
        print_dry_run(&file);
        return Ok(());
    }

    let table = builtin_table();
    let graph = file.build(&table)?;
    let options = run_options(&file, &args);
    debug!(?options, "resolved run options");

    let results = match graph.execute(&options) {
        Ok(results) => results,
        Err(GraphError::PartialFailureDeadlock(partial)) => {
            print_results(&partial)?;
            bail!("no task could make progress after a failure");
        }
        Err(err) => return Err(err.into()),
    };

    print_results(&results)?;

    let failed = results.iter().filter(|(_, outcome)| outcome.is_err()).count();
    if failed > 0 {
        bail!("{failed} task(s) failed");
    }
    info!(tasks = results.len(), "all tasks succeeded");
    Ok(())
}

fn run_options(file: &GraphFile, args: &CliArgs) -> ExecuteOptions {
    let mut options = file.graph.options();
    if let Some(strategy) = args.strategy {
        options = options.strategy(strategy);
    }
    if let Some(pool) = args.pool {
        options = options.pool_kind(pool);
    }
    if let Some(workers) = args.workers {
        options = options.worker_count(usize::from(workers));
    }
    if let Some(scheduler) = args.scheduler {
        options = options.scheduler(scheduler);
    }
    if args.best_effort {
        options = options.raise_immediately(false);
    }
    options
}

fn print_results(results: &ResultsMap) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&results.to_json())?);
    Ok(())
}

/// Simple dry-run output: print graph options and tasks.
fn print_dry_run(file: &GraphFile) {
    let section = &file.graph;
    println!("taskgraph dry-run");
    if let Some(name) = &section.name {
        println!("  graph.name = {name}");
    }
    println!("  graph.strategy = {:?}", section.strategy);
    println!("  graph.pool = {:?}", section.pool);
    if let Some(workers) = section.workers {
        println!("  graph.workers = {workers}");
    }
    println!("  graph.raise_immediately = {}", section.raise_immediately);
    println!();

    println!("tasks ({}):", file.task.len());
    for (name, task) in file.task.iter() {
        println!("  - {name}");
        println!("      work: {}", task.work);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if !task.output_names.is_empty() {
            println!("      output_names: {:?}", task.output_names);
        }
        if !task.init_kwargs.is_empty() {
            let keys: Vec<&String> = task.init_kwargs.keys().collect();
            println!("      init_kwargs: {keys:?}");
        }
    }

    debug!("dry-run complete (no execution)");
}
