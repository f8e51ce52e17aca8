//! Media and server models

use serde::{Deserialize, Serialize};

/// How a media's artifacts are replicated to the local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicationPolicy {
    #[default]
    None,
    OnDemand,
    Seed,
    Full,
}

impl ReplicationPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::OnDemand => "on-demand",
            Self::Seed => "seed",
            Self::Full => "full",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "none" => Self::None,
            "on-demand" => Self::OnDemand,
            "seed" => Self::Seed,
            "full" => Self::Full,
            _ => return None,
        })
    }
}

/// Address-family preference for a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    #[default]
    Auto,
    V4,
    V6,
    Dual,
}

impl IpMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::V4 => "v4",
            Self::V6 => "v6",
            Self::Dual => "dual",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "auto" => Self::Auto,
            "v4" => Self::V4,
            "v6" => Self::V6,
            "dual" => Self::Dual,
            _ => return None,
        })
    }
}

/// A logical repository the user subscribes to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: i64,
    /// Unique display name, e.g. "Core Release"
    pub name: String,
    /// Filesystem-safe identifier, e.g. "core_release"
    pub short_id: String,
    pub enabled: bool,
    /// Eligible for `upgrade`
    pub update: bool,
    pub priority: i64,
    pub replication: ReplicationPolicy,
    pub seed_sections: Option<String>,
    /// Cache quota in bytes (0 = unlimited)
    pub quota_bytes: i64,
    /// Retention metadata; never acted on implicitly (quota drives eviction)
    pub retention_days: i64,
    pub sync_files: bool,
    pub shared_with_peers: bool,
    /// Path below the server base URL
    pub relative_path: String,
}

/// A reachable mirror endpoint; one server may serve many media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub priority: i64,
    pub ip_mode: IpMode,
    /// Result of the last reachability test
    pub last_test_ok: Option<bool>,
    pub last_test_at: Option<i64>,
}

/// Per-media file-index snapshot state used for differential import
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaSyncState {
    pub media_id: i64,
    /// MD5 of the raw (compressed) file index
    pub files_md5: Option<String>,
    pub file_count: i64,
    pub package_count: i64,
    pub compressed_size: i64,
    pub last_sync: Option<i64>,
    /// MD5 of the raw synthesis blob
    pub synthesis_md5: Option<String>,
}
