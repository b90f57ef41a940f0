// src/exec/mod.rs

//! Execution layer: how one ready node is executed.
//!
//! - [`backend`] provides the `Backend` trait and the shared blocking driver
//!   loop used by the pooled runners.
//! - [`sequential`] runs calls inline on the calling thread.
//! - [`pooled`] submits calls to a rayon thread pool.
//! - [`process`] submits calls to child worker processes and implements the
//!   worker side of that protocol.
//! - [`cooperative`] spawns calls as units on a single-threaded tokio
//!   runtime.

pub mod backend;
pub mod cooperative;
pub mod pooled;
pub mod process;
pub mod sequential;

pub use backend::{drive, Backend, Completion};
pub use pooled::ThreadPoolBackend;
pub use process::{serve, serve_if_worker, ProcessPoolBackend, WORKER_ENV};
