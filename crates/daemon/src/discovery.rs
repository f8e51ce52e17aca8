//! LAN peer discovery over UDP broadcast
//!
//! Each daemon periodically broadcasts a magic-prefixed JSON
//! announcement and listens for others. Received announcements populate
//! the peer table; a new peer gets our announcement pushed back over
//! HTTP so both sides converge without waiting a broadcast cycle.
//! Development-mode daemons only see development-mode peers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use urpm_config::paths::DISCOVERY_MAGIC;
use urpm_errors::{DaemonError, Error};
use urpm_events::{Event, EventSender, EventSenderExt};
use urpm_net::{NetClient, PeerClient};
use urpm_types::{Announcement, PeerInfo};

use crate::state::DaemonState;

/// Encode an announcement datagram
#[must_use]
pub fn encode_datagram(announcement: &Announcement) -> Vec<u8> {
    let mut out = DISCOVERY_MAGIC.to_vec();
    if let Ok(json) = serde_json::to_vec(announcement) {
        out.extend_from_slice(&json);
    }
    out
}

/// Decode a datagram; None for foreign or malformed traffic
#[must_use]
pub fn decode_datagram(data: &[u8]) -> Option<Announcement> {
    let payload = data.strip_prefix(DISCOVERY_MAGIC.as_slice())?;
    serde_json::from_slice(payload).ok()
}

/// Periodic announcement broadcaster
pub struct Broadcaster {
    pub state: Arc<DaemonState>,
    pub interval: Duration,
}

impl Broadcaster {
    /// Broadcast until the task is aborted.
    ///
    /// # Errors
    ///
    /// Returns an error only when the socket cannot be created.
    pub async fn run(self) -> Result<(), Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| DaemonError::Discovery(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| DaemonError::Discovery(e.to_string()))?;

        let port = self.state.config.discovery_port();
        let target = SocketAddr::from(([255, 255, 255, 255], port));
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            match self.state.announcement().await {
                Ok(announcement) => {
                    let datagram = encode_datagram(&announcement);
                    if let Err(e) = socket.send_to(&datagram, target).await {
                        debug!(error = %e, "broadcast failed");
                    }
                }
                Err(e) => warn!(error = %e, "could not build announcement"),
            }
        }
    }
}

/// Announcement listener: receives broadcasts, updates the peer table,
/// answers new peers back over HTTP.
pub struct Listener {
    pub state: Arc<DaemonState>,
    pub tx: EventSender,
}

impl Listener {
    /// Listen until the task is aborted.
    ///
    /// # Errors
    ///
    /// Returns an error when the discovery port cannot be bound.
    pub async fn run(self) -> Result<(), Error> {
        let port = self.state.config.discovery_port();
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .await
            .map_err(|e| DaemonError::Discovery(format!("bind :{port}: {e}")))?;
        info!(port, "discovery listening");

        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                continue;
            };
            let Some(announcement) = decode_datagram(&buf[..len]) else {
                continue;
            };
            if let Err(e) = self.handle(announcement, from).await {
                debug!(error = %e, "announcement rejected");
            }
        }
    }

    async fn handle(&self, announcement: Announcement, from: SocketAddr) -> Result<(), Error> {
        if announcement.machine_id == self.state.machine_id {
            return Ok(()); // our own broadcast
        }
        if announcement.development_mode != self.state.config.general.development {
            return Ok(());
        }

        let known = self
            .state
            .catalog
            .list_peers()
            .await?
            .iter()
            .any(|p| p.machine_id == announcement.machine_id);

        let peer = PeerInfo {
            host: from.ip().to_string(),
            port: announcement.http_port,
            machine_id: announcement.machine_id.clone(),
            release: announcement.release.clone(),
            arch: announcement.arch.clone(),
            last_seen: chrono::Utc::now().timestamp(),
            blacklisted: false,
            development_mode: announcement.development_mode,
            served_media: announcement.served_media.clone(),
        };
        self.state.catalog.upsert_peer(&peer).await?;

        if !known {
            self.tx.emit(Event::PeerDiscovered {
                host: peer.host.clone(),
                port: peer.port,
                machine_id: peer.machine_id.clone(),
            });

            // Piggyback: answer a first-seen peer directly so it learns
            // about us before our next broadcast
            if let Ok(ours) = self.state.announcement().await {
                let net = NetClient::with_defaults()?;
                let client = PeerClient::new(net, Duration::from_secs(2));
                if let Err(e) = client.announce(&peer, &ours).await {
                    debug!(host = %peer.host, error = %e, "announce-back failed");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement() -> Announcement {
        Announcement {
            machine_id: "ab12".into(),
            http_port: 9876,
            release: "10".into(),
            arch: "x86_64".into(),
            served_media: vec!["core_release".into()],
            development_mode: false,
        }
    }

    #[test]
    fn datagram_round_trip() {
        let a = announcement();
        let datagram = encode_datagram(&a);
        assert!(datagram.starts_with(b"URPMD1"));

        let back = decode_datagram(&datagram).unwrap();
        assert_eq!(back.machine_id, "ab12");
        assert_eq!(back.http_port, 9876);
    }

    #[test]
    fn foreign_traffic_is_ignored() {
        assert!(decode_datagram(b"NOTURPMD {}").is_none());
        assert!(decode_datagram(b"URPMD1 not json").is_none());
        assert!(decode_datagram(b"").is_none());
    }
}
