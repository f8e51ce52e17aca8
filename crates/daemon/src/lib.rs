#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! The urpmd daemon
//!
//! A small HTTP API over the catalog, UDP peer discovery, and the
//! background maintenance scheduler, multiplexed on one cooperative
//! runtime. The catalog writer serializes state; workers pass
//! identifiers, never shared references.

pub mod discovery;
pub mod scheduler;
pub mod server;
pub mod state;

pub use discovery::{Broadcaster, Listener};
pub use scheduler::Scheduler;
pub use state::DaemonState;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use urpm_errors::{DaemonError, Error};
use urpm_events::EventSender;

/// Write the pid file, failing when another daemon owns it.
///
/// # Errors
///
/// Returns `DaemonError::AlreadyRunning` with the live owner's pid.
pub async fn write_pid_file(path: &Path) -> Result<(), Error> {
    if let Ok(contents) = tokio::fs::read_to_string(path).await {
        if let Ok(pid) = contents.trim().parse::<u32>() {
            if Path::new(&format!("/proc/{pid}")).exists() {
                return Err(DaemonError::AlreadyRunning { pid }.into());
            }
        }
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    tokio::fs::write(path, std::process::id().to_string())
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    Ok(())
}

/// Run the daemon: API server, discovery, scheduler. Returns when any
/// of them dies (supervision restarts the process).
///
/// # Errors
///
/// Propagates the first fatal error of any component.
pub async fn run(state: Arc<DaemonState>, tx: EventSender) -> Result<(), Error> {
    state.catalog.clear_peers().await?;

    let broadcaster = Broadcaster {
        state: Arc::clone(&state),
        interval: Duration::from_secs(state.config.daemon.announce_interval_secs),
    };
    let listener = Listener {
        state: Arc::clone(&state),
        tx: tx.clone(),
    };
    let scheduler = Scheduler {
        state: Arc::clone(&state),
        tx,
    };

    info!(
        machine_id = %state.machine_id,
        development = state.config.general.development,
        "urpmd starting"
    );

    tokio::select! {
        result = server::serve(Arc::clone(&state)) => result,
        result = broadcaster.run() => result,
        result = listener.run() => result,
        () = scheduler.run() => Ok(()),
    }
}
