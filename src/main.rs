// src/main.rs

use taskgraph::builtins::builtin_table;
use taskgraph::exec::serve_if_worker;
use taskgraph::{cli, logging, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("taskgraph error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    // Process pool workers speak JSON on stdout; nothing else may print.
    if serve_if_worker(&builtin_table())? {
        return Ok(());
    }

    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args)
}
