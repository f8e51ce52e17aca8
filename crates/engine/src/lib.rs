#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Transaction engine for urpm
//!
//! Turns resolver output into executed RPM transactions: artifact
//! acquisition (cache, peers, mirrors), the RPM handoff under the
//! exclusive lock, atomic history recording with undo/rollback, media
//! synchronization, and quota-driven cache eviction.

mod acquire;
mod cache;
mod executor;
mod sync;
mod undo;

pub use acquire::{Acquired, Acquirer, Source};
pub use cache::{CacheEvictor, EvictionOutcome};
pub use executor::{ExecutionRequest, Executor};
pub use sync::{MediaSync, SyncOutcome};
pub use undo::UndoDriver;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use urpm_config::Config;
use urpm_errors::Error;
use urpm_events::EventSender;
use urpm_net::{MirrorSelector, NetClient, NetConfig};
use urpm_rpm::RpmTransaction;
use urpm_store::Catalog;

/// Everything the engine needs, wired once at startup and passed
/// explicitly (no ambient globals).
pub struct Engine {
    pub catalog: Catalog,
    pub net: NetClient,
    pub selector: Arc<MirrorSelector>,
    pub rpm: Arc<dyn RpmTransaction>,
    pub cache_dir: PathBuf,
    pub lock_path: PathBuf,
    pub config: Config,
    pub tx: EventSender,
    pub cancel: Arc<AtomicBool>,
}

impl Engine {
    /// Wire an engine from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the network client cannot be built.
    pub fn new(
        catalog: Catalog,
        rpm: Arc<dyn RpmTransaction>,
        config: Config,
        tx: EventSender,
    ) -> Result<Self, Error> {
        let net = NetClient::new(NetConfig {
            inactivity_timeout: std::time::Duration::from_secs(
                config.network.inactivity_timeout_secs,
            ),
            ip_mode: config.network.ip_mode,
            ..NetConfig::default()
        })?;
        let cache_dir = config.cache_dir();
        let lock_path = urpm_config::paths::base_dir(config.general.development).join("urpm.lock");

        Ok(Self {
            catalog,
            net,
            selector: Arc::new(MirrorSelector::new()),
            rpm,
            cache_dir,
            lock_path,
            config,
            tx,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cancellation flag observed at suspension points
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Acquisition context for this engine
    #[must_use]
    pub fn acquirer(&self) -> Acquirer {
        Acquirer {
            catalog: self.catalog.clone(),
            net: self.net.clone(),
            selector: Arc::clone(&self.selector),
            cache_dir: self.cache_dir.clone(),
            max_workers: self.config.network.max_downloads,
            peer_timeout: std::time::Duration::from_secs(self.config.network.peer_timeout_secs),
            tx: self.tx.clone(),
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Executor for this engine
    #[must_use]
    pub fn executor(&self) -> Executor {
        Executor {
            catalog: self.catalog.clone(),
            rpm: Arc::clone(&self.rpm),
            acquirer: self.acquirer(),
            lock_path: self.lock_path.clone(),
            tx: self.tx.clone(),
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Media synchronization driver
    #[must_use]
    pub fn media_sync(&self) -> MediaSync {
        MediaSync {
            catalog: self.catalog.clone(),
            net: self.net.clone(),
            selector: Arc::clone(&self.selector),
            tx: self.tx.clone(),
        }
    }

    /// Cache eviction driver
    #[must_use]
    pub fn cache_evictor(&self) -> CacheEvictor {
        CacheEvictor {
            catalog: self.catalog.clone(),
            cache_dir: self.cache_dir.clone(),
            tx: self.tx.clone(),
        }
    }
}
