#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! urpmd - the urpm daemon
//!
//! Serves the local HTTP API, discovers LAN peers, and runs the
//! maintenance scheduler. One instance per machine, guarded by the pid
//! file; a non-zero exit lets supervision restart it.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use urpm_config::Config;
use urpm_daemon::DaemonState;
use urpm_engine::Engine;
use urpm_errors::Error;
use urpm_rpm::ProcessRpm;
use urpm_store::Catalog;

/// urpmd - urpm background daemon
#[derive(Parser)]
#[command(name = "urpmd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Development mode (separate database, cache and ports)
    #[arg(long)]
    dev: bool,

    /// Override the API port
    #[arg(long)]
    port: Option<u16>,

    /// Log filter (overrides RUST_LOG)
    #[arg(long)]
    log: Option<String>,
}

fn init_tracing(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;
    let filter = filter
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("urpmd=info,urpm_daemon=info,urpm_engine=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    if let Err(e) = run(args).await {
        error!(error = %e, "urpmd exiting");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let mut config = Config::load_default(args.dev).await?;
    if let Some(port) = args.port {
        config.daemon.api_port = Some(port);
    }

    urpm_daemon::write_pid_file(&urpm_config::paths::pid_file(
        config.general.development,
    ))
    .await?;

    let catalog = Catalog::open(&config.catalog_db()).await?;
    let (tx, mut rx) = urpm_events::channel();

    let rpm = Arc::new(ProcessRpm::new(config.general.root.clone()));
    let engine = Arc::new(Engine::new(catalog.clone(), rpm, config.clone(), tx.clone())?);
    let state = DaemonState::new(catalog, engine, config).await?;

    // The daemon logs events instead of rendering them
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!(?event, "event");
        }
    });

    tokio::select! {
        result = urpm_daemon::run(state, tx) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    }
}
