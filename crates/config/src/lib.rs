#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for urpm
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (/etc/urpm/urpm.toml, or the user config dir in
//!   development mode)
//! - CLI flags (applied by the binaries)

pub mod legacy;
pub mod paths;

pub use legacy::{parse_urpmi_cfg, LegacyMedia};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use urpm_errors::{ConfigError, Error};
use urpm_types::IpMode;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Development mode: separate database, cache, ports
    pub development: bool,
    /// Root for RPM operations (--root)
    pub root: Option<PathBuf>,
    /// Include recommends by default
    pub with_recommends: bool,
    /// Locale tag used as a resolver tie-break (e.g. "fr")
    pub locale: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            development: false,
            root: None,
            with_recommends: true,
            locale: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Parallel downloads
    pub max_downloads: usize,
    /// Seconds without data before a chunk is considered stalled
    pub inactivity_timeout_secs: u64,
    /// Total timeout for peer queries
    pub peer_timeout_secs: u64,
    pub ip_mode: IpMode,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_downloads: 4,
            inactivity_timeout_secs: 30,
            peer_timeout_secs: 2,
            ip_mode: IpMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Override API port (defaults derive from development mode)
    pub api_port: Option<u16>,
    pub discovery_port: Option<u16>,
    /// Seconds between metadata refresh runs
    pub refresh_interval_secs: u64,
    /// Seconds between cache quota checks
    pub eviction_interval_secs: u64,
    /// Seconds between stale-peer sweeps
    pub peer_cleanup_interval_secs: u64,
    /// Seconds between predictive pre-download runs (0 disables)
    pub predictive_interval_secs: u64,
    /// Announce interval for discovery broadcasts
    pub announce_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_port: None,
            discovery_port: None,
            refresh_interval_secs: 3600,
            eviction_interval_secs: 1800,
            peer_cleanup_interval_secs: 60,
            predictive_interval_secs: 0,
            announce_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default per-media quota in bytes when the media doesn't set one
    pub default_quota_bytes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            // 2 GiB
            default_quota_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid TOML.
    pub async fn load(path: &Path) -> Result<Self, Error> {
        match fs::read_to_string(path).await {
            Ok(contents) => toml::from_str(&contents).map_err(|e| {
                ConfigError::ParseError {
                    message: e.to_string(),
                }
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::io_with_path(&e, path)),
        }
    }

    /// Load from the default location for the given mode
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub async fn load_default(development: bool) -> Result<Self, Error> {
        let mut config = Self::load(&paths::config_file(development)).await?;
        config.general.development |= development;
        Ok(config)
    }

    /// Effective API port
    #[must_use]
    pub fn api_port(&self) -> u16 {
        self.daemon.api_port.unwrap_or(if self.general.development {
            paths::API_PORT_DEV
        } else {
            paths::API_PORT
        })
    }

    /// Effective discovery port
    #[must_use]
    pub fn discovery_port(&self) -> u16 {
        self.daemon
            .discovery_port
            .unwrap_or(if self.general.development {
                paths::DISCOVERY_PORT_DEV
            } else {
                paths::DISCOVERY_PORT
            })
    }

    /// Catalog database path for this configuration
    #[must_use]
    pub fn catalog_db(&self) -> PathBuf {
        paths::catalog_db(self.general.development)
    }

    /// Package cache root for this configuration
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        paths::cache_dir(self.general.development)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.network.max_downloads, 4);
        assert_eq!(c.network.peer_timeout_secs, 2);
        assert!(c.general.with_recommends);
        assert_eq!(c.api_port(), paths::API_PORT);
    }

    #[test]
    fn development_switches_ports() {
        let mut c = Config::default();
        c.general.development = true;
        assert_eq!(c.api_port(), paths::API_PORT_DEV);
        assert_eq!(c.discovery_port(), paths::DISCOVERY_PORT_DEV);
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let c = Config::load(Path::new("/nonexistent/urpm.toml"))
            .await
            .unwrap();
        assert_eq!(c.network.max_downloads, 4);
    }

    #[tokio::test]
    async fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urpm.toml");
        tokio::fs::write(&path, "[network]\nmax_downloads = 8\n")
            .await
            .unwrap();
        let c = Config::load(&path).await.unwrap();
        assert_eq!(c.network.max_downloads, 8);
        assert!(c.general.with_recommends);
    }
}
