// src/exec/process.rs

//! Process pool execution.
//!
//! The pool spawns `worker_count` children of a worker program (by default
//! the current executable) with `TASKGRAPH_WORKER=1` set. A worker answers
//! one JSON line per request on stdout:
//!
//! ```text
//! -> {"id":3,"work":"sum","args":{"positional":[{"Int":1},{"Int":2}],"keyword":{}}}
//! <- {"id":3,"outcome":{"ok":{"Int":3}}}
//! ```
//!
//! Work crosses the process boundary by its [`WorkTable`] key, so every node
//! in a process-pooled graph must wrap table-registered synchronous work.
//! Programs that can act as workers call [`serve_if_worker`] first thing in
//! `main`.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context};
use crossbeam::channel::{self, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::dag::ResultsMap;
use crate::engine::{ExecuteOptions, NodeCall, RunCore};
use crate::errors::{GraphError, Result};
use crate::exec::backend::{drive, Backend, Completion};
use crate::value::{Args, Value};
use crate::work::WorkTable;

/// Set (to any value) in the environment of spawned workers.
pub const WORKER_ENV: &str = "TASKGRAPH_WORKER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: usize,
    pub work: String,
    pub args: Args,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: usize,
    pub outcome: WireOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOutcome {
    Ok(Value),
    Err(String),
}

struct Job {
    index: usize,
    key: String,
    args: Args,
}

pub struct ProcessPoolBackend {
    jobs: Option<Sender<Job>>,
    completions: Receiver<Completion>,
    cancelled: Arc<AtomicBool>,
    feeders: Vec<JoinHandle<()>>,
}

impl ProcessPoolBackend {
    pub fn spawn(program: PathBuf, workers: usize) -> Result<Self> {
        let (jobs_tx, jobs_rx) = channel::unbounded::<Job>();
        let (completions_tx, completions_rx) = channel::unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut backend = Self {
            jobs: Some(jobs_tx),
            completions: completions_rx,
            cancelled: Arc::clone(&cancelled),
            feeders: Vec::with_capacity(workers),
        };

        info!(program = %program.display(), workers, "starting worker processes");
        for id in 0..workers.max(1) {
            let worker = Worker::start(&program).map_err(|e| {
                GraphError::Pool(format!(
                    "failed to start worker '{}': {e:#}",
                    program.display()
                ))
            })?;

            let jobs = jobs_rx.clone();
            let completions = completions_tx.clone();
            let cancelled = Arc::clone(&cancelled);
            let handle = std::thread::Builder::new()
                .name(format!("taskgraph-feeder-{id}"))
                .spawn(move || worker.feed(jobs, completions, cancelled))?;
            backend.feeders.push(handle);
        }

        Ok(backend)
    }
}

impl Backend for ProcessPoolBackend {
    fn submit(&mut self, call: NodeCall) -> Result<()> {
        let NodeCall { index, node, args } = call;
        let key = node.work().key().map(str::to_string).ok_or_else(|| {
            GraphError::Pool(format!("task '{}' has no work key", node.name()))
        })?;

        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| GraphError::Pool("worker pool is shut down".to_string()))?;
        jobs.send(Job { index, key, args })
            .map_err(|_| GraphError::Pool("all worker feeders have exited".to_string()))
    }

    fn next_completion(&mut self) -> Result<Completion> {
        self.completions
            .recv()
            .map_err(|_| GraphError::Pool("all worker processes have exited".to_string()))
    }

    fn abort(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for ProcessPoolBackend {
    fn drop(&mut self) {
        // Closing the job channel lets every feeder finish its current job,
        // close the child's stdin and reap it.
        self.jobs.take();
        for handle in self.feeders.drain(..) {
            if handle.join().is_err() {
                warn!("worker feeder thread panicked");
            }
        }
    }
}

/// One child process plus its pipes.
struct Worker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Worker {
    fn start(program: &Path) -> anyhow::Result<Self> {
        let mut child = Command::new(program)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("spawning worker process")?;

        let stdin = child.stdin.take().context("worker stdin not captured")?;
        let stdout = child.stdout.take().context("worker stdout not captured")?;
        debug!(pid = child.id(), "worker process started");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    fn feed(
        mut self,
        jobs: Receiver<Job>,
        completions: Sender<Completion>,
        cancelled: Arc<AtomicBool>,
    ) {
        while let Ok(job) = jobs.recv() {
            if cancelled.load(Ordering::SeqCst) {
                trace!(work = %job.key, "skipping cancelled job");
                continue;
            }
            let index = job.index;
            let outcome = self.round_trip(job);
            if completions.send(Completion { index, outcome }).is_err() {
                break;
            }
        }

        let pid = self.child.id();
        drop(self.stdin);
        match self.child.wait() {
            Ok(status) => debug!(pid, %status, "worker process exited"),
            Err(e) => warn!(pid, error = %e, "failed to reap worker process"),
        }
    }

    fn round_trip(&mut self, job: Job) -> anyhow::Result<Value> {
        let request = WorkerRequest {
            id: job.index,
            work: job.key,
            args: job.args,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.flush())
            .context("writing request to worker")?;

        let mut reply = String::new();
        if self.stdout.read_line(&mut reply).context("reading worker reply")? == 0 {
            return Err(anyhow!("worker process exited unexpectedly"));
        }
        let response: WorkerResponse =
            serde_json::from_str(&reply).context("malformed worker reply")?;
        if response.id != request.id {
            return Err(anyhow!(
                "worker replied to request {} while {} was pending",
                response.id,
                request.id
            ));
        }

        match response.outcome {
            WireOutcome::Ok(value) => Ok(value),
            WireOutcome::Err(message) => Err(anyhow!(message)),
        }
    }
}

/// Run `core` on a pool of worker processes.
///
/// Fails before spawning anything if a node's work is async or was not
/// resolved from a [`WorkTable`].
pub fn run(core: RunCore, options: &ExecuteOptions) -> Result<ResultsMap> {
    for node in core.nodes() {
        if node.is_async() {
            return Err(GraphError::Pool(format!(
                "task '{}' wraps async work, which cannot run in a process pool",
                node.name()
            )));
        }
        if node.work().key().is_none() {
            return Err(GraphError::Pool(format!(
                "task '{}' wraps work without a table key, which cannot run in a process pool",
                node.name()
            )));
        }
    }

    let program = match &options.worker_program {
        Some(program) => program.clone(),
        None => std::env::current_exe()?,
    };
    let workers = options.worker_count.max(1).min(core.nodes().len().max(1));

    let mut backend = ProcessPoolBackend::spawn(program, workers)?;
    drive(core, &mut backend)
}

/// If this process was started as a pool worker, serve requests from stdin
/// until it closes and return `true`. Otherwise return `false` immediately.
pub fn serve_if_worker(table: &WorkTable) -> anyhow::Result<bool> {
    if std::env::var_os(WORKER_ENV).is_none() {
        return Ok(false);
    }
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock(), table)?;
    Ok(true)
}

/// Answer worker requests line by line. Work failures are reported back to
/// the pool; only I/O and protocol errors end the loop.
pub fn serve<R, W>(reader: R, mut writer: W, table: &WorkTable) -> anyhow::Result<()>
where
    R: BufRead,
    W: Write,
{
    for line in reader.lines() {
        let line = line.context("reading request")?;
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest =
            serde_json::from_str(&line).context("malformed worker request")?;

        let outcome = match table.get(&request.work) {
            Some(work) => match work.call_blocking(request.args) {
                Ok(value) => WireOutcome::Ok(value),
                Err(e) => WireOutcome::Err(format!("{e:#}")),
            },
            None => WireOutcome::Err(format!("unknown work '{}'", request.work)),
        };

        let response = WorkerResponse {
            id: request.id,
            outcome,
        };
        serde_json::to_writer(&mut writer, &response)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(())
}
