//! loft-dispatch — deployment intake.
//!
//! The dispatcher turns a deployment request into a QUEUED record plus a
//! launched build worker instance, and answers immediately with the
//! deployment id and predicted URL — it never waits for the build. The
//! orchestration platform sits behind the [`WorkerLauncher`] seam; the
//! shipped implementation spawns the `loft-worker` binary as a detached
//! child process.

pub mod dispatcher;
pub mod error;
pub mod launcher;

pub use dispatcher::{Dispatcher, LaunchRequest, LaunchResponse};
pub use error::{DispatchError, DispatchResult};
pub use launcher::{ProcessLauncher, WorkerLauncher};
