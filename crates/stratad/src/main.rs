//! stratad — the Strata analytics daemon.
//!
//! Single binary that assembles the Strata subsystems:
//! - Record store (redb)
//! - Tenant-aware query layer (translator + upsert generator)
//! - Cluster coordinator + query router
//! - HTTP query API
//!
//! # Usage
//!
//! ```text
//! stratad standalone --port 8400 --data-dir /var/lib/strata
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;

use clap::{Parser, Subcommand};
use tracing::info;

use strata_cluster::{
    ClusterConfig, ClusterCoordinator, DisabledMembership, QueryRouter, ScanEngineConnector,
    new_shared_engine,
};
use strata_query::{QueryTranslator, UpsertRecordGenerator};
use strata_store::{RecordStore, RedbRecordStore, TableKeyStore};

use stratad::api::{self, AppState};

#[derive(Parser)]
#[command(name = "stratad", about = "Strata analytics daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (single node, in-process scan engine).
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8400")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/strata")]
        data_dir: PathBuf,

        /// Optional cluster config file (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,stratad=debug,strata=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            config,
        } => run_standalone(port, data_dir, config).await,
    }
}

async fn run_standalone(
    port: u16,
    data_dir: PathBuf,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("Strata daemon starting in standalone mode");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("strata.redb");

    let config = match config {
        Some(path) => ClusterConfig::from_file(&path)?,
        None => ClusterConfig::default(),
    };

    // Record store.
    let store: Arc<dyn RecordStore> = Arc::new(RedbRecordStore::open(&db_path)?);
    info!(path = ?db_path, "record store opened");

    // Query layer.
    let keys = TableKeyStore::new(store.clone());
    let translator = QueryTranslator::new(store.clone(), keys.clone());
    let generator = UpsertRecordGenerator::new(keys);

    // Router + coordinator. Standalone nodes carry a disabled
    // membership provider; the coordinator arms the in-process engine.
    let engine = new_shared_engine();
    let worker_count = Arc::new(AtomicUsize::new(1));
    let router = Arc::new(QueryRouter::new(
        Arc::new(DisabledMembership),
        engine.clone(),
        store.clone(),
        translator,
        generator,
        worker_count.clone(),
    ));
    let mut coordinator = ClusterCoordinator::new(
        config,
        Arc::new(DisabledMembership),
        Arc::new(strata_cluster::CommandLauncher::new("strata-compute")),
        Arc::new(ScanEngineConnector),
        engine,
        worker_count,
        router.clone(),
    )?;
    info!(role = ?coordinator.role(), "cluster coordinator initialized");

    // HTTP API.
    let app = api::build_router(AppState { router, store });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "query API starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutdown signal received");
        })
        .await?;

    coordinator.stop();
    info!("Strata daemon stopped");
    Ok(())
}
