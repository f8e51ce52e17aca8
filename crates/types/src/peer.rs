//! LAN peer models

use serde::{Deserialize, Serialize};

/// A discovered urpmd peer. Rows are ephemeral: recreated on each daemon
/// run and expired after the stale window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub host: String,
    pub port: u16,
    /// Stable UUID identifying the machine across restarts
    pub machine_id: String,
    pub release: String,
    pub arch: String,
    pub last_seen: i64,
    pub blacklisted: bool,
    pub development_mode: bool,
    pub served_media: Vec<String>,
}

impl PeerInfo {
    /// Whether the peer is still within the stale window
    #[must_use]
    pub fn is_alive(&self, now: i64, stale_after_secs: i64) -> bool {
        now - self.last_seen < stale_after_secs
    }
}

/// Wire form of a peer announcement (UDP broadcast payload and
/// `POST /api/announce` body)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub machine_id: String,
    pub http_port: u16,
    pub release: String,
    pub arch: String,
    pub served_media: Vec<String>,
    pub development_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_window() {
        let peer = PeerInfo {
            host: "192.168.1.7".into(),
            port: 9876,
            machine_id: "m".into(),
            release: "10".into(),
            arch: "x86_64".into(),
            last_seen: 1000,
            blacklisted: false,
            development_mode: false,
            served_media: vec![],
        };
        assert!(peer.is_alive(1100, 180));
        assert!(!peer.is_alive(1300, 180));
    }

    #[test]
    fn announcement_wire_format() {
        let json = r#"{"machine_id":"ab","http_port":9876,"release":"10",
            "arch":"x86_64","served_media":["core_release"],"development_mode":false}"#;
        let a: Announcement = serde_json::from_str(json).unwrap();
        assert_eq!(a.http_port, 9876);
        assert_eq!(a.served_media, vec!["core_release"]);
    }
}
