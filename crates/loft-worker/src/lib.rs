//! loft-worker — the isolated build worker.
//!
//! One worker process runs exactly one deployment through the pipeline
//! `CLONING → BUILDING → DETECTING_OUTPUT → UPLOADING`, with a failure at
//! any stage absorbing into a terminal FAIL. Along the way every build
//! output line and every lifecycle transition is published onto the event
//! channels; the worker never waits for a consumer.
//!
//! Workers share no mutable state with each other or with the control
//! plane — the execution context arrives through environment variables
//! (see `loft_core::context`) and everything else is reachable only
//! through the explicit handles in [`runner::WorkerDeps`].

pub mod build;
pub mod classify;
pub mod error;
pub mod output;
pub mod repo;
pub mod runner;
pub mod sink;
pub mod upload;

pub use error::{WorkerError, WorkerResult};
pub use runner::{WorkerDeps, run};
pub use sink::EventSink;
