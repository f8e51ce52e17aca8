//! Shared daemon state

use std::sync::Arc;

use urpm_config::Config;
use urpm_engine::Engine;
use urpm_errors::Error;
use urpm_store::Catalog;
use urpm_types::Announcement;

/// Peer staleness windows (seconds)
pub const PEER_STALE_SECS: i64 = 180;
pub const PEER_STALE_SECS_DEV: i64 = 45;

/// Everything the API handlers, discovery and scheduler share. Built
/// once at startup; workers receive clones of the Arc.
pub struct DaemonState {
    pub catalog: Catalog,
    pub engine: Arc<Engine>,
    pub config: Config,
    /// Stable machine identity, persisted in settings
    pub machine_id: String,
    /// Distribution release (os-release VERSION_ID)
    pub release: String,
    pub started_at: i64,
}

impl DaemonState {
    /// Load or mint the persistent machine id, then assemble the state.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings table cannot be read or written.
    pub async fn new(catalog: Catalog, engine: Arc<Engine>, config: Config) -> Result<Arc<Self>, Error> {
        let machine_id = match catalog.setting("machine_id").await? {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                catalog.set_setting("machine_id", &id).await?;
                id
            }
        };

        Ok(Arc::new(Self {
            catalog,
            engine,
            config,
            machine_id,
            release: distro_release().await,
            started_at: chrono::Utc::now().timestamp(),
        }))
    }

    /// Stale window for the configured mode
    #[must_use]
    pub fn peer_stale_secs(&self) -> i64 {
        if self.config.general.development {
            PEER_STALE_SECS_DEV
        } else {
            PEER_STALE_SECS
        }
    }

    /// Our own discovery announcement
    ///
    /// # Errors
    ///
    /// Returns an error if the media listing fails.
    pub async fn announcement(&self) -> Result<Announcement, Error> {
        let served_media = self
            .catalog
            .list_media()
            .await?
            .into_iter()
            .filter(|m| m.enabled && m.shared_with_peers)
            .map(|m| m.short_id)
            .collect();

        Ok(Announcement {
            machine_id: self.machine_id.clone(),
            http_port: self.config.api_port(),
            release: self.release.clone(),
            arch: std::env::consts::ARCH.to_string(),
            served_media,
            development_mode: self.config.general.development,
        })
    }
}

/// VERSION_ID from os-release, or "unknown"
async fn distro_release() -> String {
    let Ok(contents) = tokio::fs::read_to_string("/etc/os-release").await else {
        return "unknown".to_string();
    };
    contents
        .lines()
        .find_map(|line| line.strip_prefix("VERSION_ID="))
        .map_or_else(
            || "unknown".to_string(),
            |v| v.trim_matches('"').to_string(),
        )
}
