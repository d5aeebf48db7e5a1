//! The orchestration-platform seam.
//!
//! Launching an isolated worker instance is the only thing the dispatcher
//! asks of the outside world, so it is a single-method trait. Production
//! uses [`ProcessLauncher`]; tests use a stub.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::debug;

use loft_core::WorkerContext;

/// Starts one isolated build worker with the given execution context.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start the instance. Returning `Ok` means the instance was handed to
    /// the platform, not that the build succeeded.
    async fn launch(&self, ctx: &WorkerContext) -> Result<(), String>;
}

/// Spawns the `loft-worker` binary as a detached child process.
///
/// The execution context is injected as environment variables; the child
/// outlives the dispatcher call and reports back only through the event
/// channels.
pub struct ProcessLauncher {
    worker_binary: PathBuf,
    config_path: PathBuf,
}

impl ProcessLauncher {
    pub fn new(worker_binary: PathBuf, config_path: PathBuf) -> Self {
        Self {
            worker_binary,
            config_path,
        }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, ctx: &WorkerContext) -> Result<(), String> {
        let child = tokio::process::Command::new(&self.worker_binary)
            .envs(ctx.to_env())
            .env("LOFT_CONFIG", &self.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| e.to_string())?;

        debug!(
            deployment = %ctx.deployment_id,
            pid = child.id(),
            "worker instance launched"
        );
        // The child is intentionally not awaited — fire and forget.
        Ok(())
    }
}
