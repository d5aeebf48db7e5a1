//! loft-worker — entrypoint of the isolated build instance.
//!
//! The dispatcher launches one of these per deployment with the execution
//! context in environment variables. The process runs a single pipeline
//! and exits: 0 on READY, 1 on FAIL. Everything user-visible flows out
//! through the event channels, not this process's stdout.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use loft_core::{LoftConfig, WorkerContext, artifacts};
use loft_events::EventProducer;
use loft_worker::WorkerDeps;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loft_worker=debug".parse().unwrap()),
        )
        .init();

    let ctx = WorkerContext::from_env().context("reading worker execution context")?;
    let config_path =
        std::env::var("LOFT_CONFIG").unwrap_or_else(|_| "loft.toml".to_string());
    let config = LoftConfig::from_file(Path::new(&config_path))
        .with_context(|| format!("loading {config_path}"))?;

    info!(
        deployment = %ctx.deployment_id,
        subdomain = %ctx.subdomain,
        "build worker starting"
    );

    let producer = Arc::new(EventProducer::open(&config.channels)?);
    // Pick up anything a previous worker on this host failed to send.
    if let Err(e) = producer.drain_spill().await {
        warn!(error = %e, "spill drain failed");
    }
    let store = artifacts::store_from_config(&config.artifacts)?;

    let deps = WorkerDeps {
        sink: producer.clone(),
        store,
        artifact_prefix: config.platform.artifact_prefix.clone(),
        base_domain: config.platform.base_domain.clone(),
        build_command: config.worker.build_command.clone(),
        extra_output_dirs: config.worker.extra_output_dirs.clone(),
        workspace_dir: config.worker.workspace_dir.clone(),
    };

    let result = loft_worker::run(&ctx, &deps).await;
    if let Err(e) = producer.close() {
        warn!(error = %e, "producer flush failed");
    }

    match result {
        Ok(url) => {
            info!(%url, "deployment ready");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "deployment failed");
            std::process::exit(1);
        }
    }
}
