//! loftd — the Loft daemon.
//!
//! Single binary that assembles the control plane:
//! - State store (redb)
//! - Log and status channel ingestors
//! - Dispatcher (spawns `loft-worker` instances)
//! - REST API (axum)
//! - Artifact router (hyper) + geo cache purge loop
//!
//! # Usage
//!
//! ```text
//! loftd serve --config loft.toml --api-port 8080 --router-port 8000
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use loft_core::{LoftConfig, artifacts};
use loft_events::{LogIngestor, StatusIngestor};
use loft_router::{ArtifactRouter, GeoService, RouterServer};

#[derive(Parser)]
#[command(name = "loftd", about = "Loft deploy platform daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full control plane in one process.
    Serve {
        /// Platform configuration file.
        #[arg(long, default_value = "loft.toml")]
        config: PathBuf,

        /// Port for the Query API.
        #[arg(long, default_value = "8080")]
        api_port: u16,

        /// Port for the artifact router.
        #[arg(long, default_value = "8000")]
        router_port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/loft")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loftd=debug,loft=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            api_port,
            router_port,
            data_dir,
        } => run_serve(config, api_port, router_port, data_dir).await,
    }
}

async fn run_serve(
    config_path: PathBuf,
    api_port: u16,
    router_port: u16,
    data_dir: PathBuf,
) -> anyhow::Result<()> {
    info!("Loft daemon starting");

    let config = LoftConfig::from_file(&config_path)?;

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("loft.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // State store.
    let store = loft_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Artifact store.
    let artifact_store = artifacts::store_from_config(&config.artifacts)?;
    info!("artifact store opened");

    // Channel ingestors.
    let log_ingestor = LogIngestor::open(&config.channels, store.clone())?;
    let status_ingestor = StatusIngestor::open(&config.channels, store.clone())?;
    info!(brokers = %config.channels.brokers, "channel ingestors subscribed");

    // Dispatcher.
    let launcher = Arc::new(loft_dispatch::ProcessLauncher::new(
        config.dispatch.worker_binary.clone(),
        config_path.clone(),
    ));
    let dispatcher = Arc::new(loft_dispatch::Dispatcher::new(
        store.clone(),
        launcher,
        config.platform.base_domain.clone(),
    ));
    info!("dispatcher initialized");

    // Geo service + artifact router.
    let geo = Arc::new(GeoService::new(&config.geo));
    let router = Arc::new(ArtifactRouter::new(
        store.clone(),
        artifact_store,
        config.platform.artifact_prefix.clone(),
        geo.clone(),
    ));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let log_handle = tokio::spawn(log_ingestor.run(shutdown_rx.clone()));
    let status_handle = tokio::spawn(status_ingestor.run(shutdown_rx.clone()));
    let purge_handle = tokio::spawn(geo.clone().run_purge(
        Duration::from_secs(config.geo.purge_interval_secs),
        shutdown_rx.clone(),
    ));

    let router_addr = SocketAddr::from(([0, 0, 0, 0], router_port));
    let router_server = RouterServer::new(router_addr, router);
    let router_handle = tokio::spawn(router_server.serve(shutdown_rx.clone()));

    // ── Start API server ───────────────────────────────────────

    let api_router = loft_api::build_router(store, dispatcher);
    let api_addr = SocketAddr::from(([0, 0, 0, 0], api_port));

    info!(%api_addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(api_addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, api_router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = log_handle.await;
    let _ = status_handle.await;
    let _ = purge_handle.await;
    let _ = router_handle.await;

    info!("Loft daemon stopped");
    Ok(())
}
