//! Peer HTTP client
//!
//! Cooperative downloads are best-effort: every call here carries a
//! short total timeout so a slow peer cannot stall a transaction, and
//! every failure falls through to the next source.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use urpm_errors::{Error, NetworkError};
use urpm_types::{Announcement, PeerInfo};

use crate::NetClient;

/// `POST /api/have` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaveRequest {
    pub files: Vec<String>,
}

/// `POST /api/have` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaveResponse {
    /// Subset of the requested file names this peer can serve
    pub have: Vec<String>,
}

/// Client for talking to one discovered peer
#[derive(Clone)]
pub struct PeerClient {
    net: NetClient,
    timeout: Duration,
}

impl PeerClient {
    #[must_use]
    pub fn new(net: NetClient, timeout: Duration) -> Self {
        Self { net, timeout }
    }

    fn base(peer: &PeerInfo) -> String {
        format!("http://{}:{}", peer.host, peer.port)
    }

    /// Ask a peer which of the listed artifacts it holds
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or HTTP failure; callers treat any
    /// error as "peer has nothing".
    pub async fn have(&self, peer: &PeerInfo, files: &[String]) -> Result<HaveResponse, Error> {
        let url = format!("{}/api/have", Self::base(peer));
        let response = self
            .net
            .post_json(
                &url,
                &HaveRequest {
                    files: files.to_vec(),
                },
                self.timeout,
            )
            .await
            .map_err(|e| peer_err(peer, &e))?;

        if !response.status().is_success() {
            return Err(peer_http_err(peer, response.status().as_u16()));
        }
        response
            .json::<HaveResponse>()
            .await
            .map_err(|e| peer_err_msg(peer, &e.to_string()))
    }

    /// URL an artifact can be fetched from on this peer
    #[must_use]
    pub fn artifact_url(peer: &PeerInfo, media_short_id: &str, file_name: &str) -> String {
        format!(
            "{}/media/{media_short_id}/{file_name}",
            Self::base(peer)
        )
    }

    /// Push our announcement back over HTTP (piggyback on a received
    /// broadcast)
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or HTTP failure.
    pub async fn announce(&self, peer: &PeerInfo, announcement: &Announcement) -> Result<(), Error> {
        let url = format!("{}/api/announce", Self::base(peer));
        let response = self
            .net
            .post_json(&url, announcement, self.timeout)
            .await
            .map_err(|e| peer_err(peer, &e))?;
        if !response.status().is_success() {
            return Err(peer_http_err(peer, response.status().as_u16()));
        }
        Ok(())
    }

    /// Ask a peer to pre-download artifacts it will likely be asked for
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or HTTP failure.
    pub async fn request_download(&self, peer: &PeerInfo, files: &[String]) -> Result<(), Error> {
        let url = format!("{}/api/request-download", Self::base(peer));
        let response = self
            .net
            .post_json(
                &url,
                &HaveRequest {
                    files: files.to_vec(),
                },
                self.timeout,
            )
            .await
            .map_err(|e| peer_err(peer, &e))?;
        if !response.status().is_success() {
            return Err(peer_http_err(peer, response.status().as_u16()));
        }
        Ok(())
    }
}

fn peer_err(peer: &PeerInfo, e: &Error) -> Error {
    peer_err_msg(peer, &e.to_string())
}

fn peer_err_msg(peer: &PeerInfo, message: &str) -> Error {
    NetworkError::PeerUnreachable {
        host: peer.host.clone(),
        port: peer.port,
        message: message.to_string(),
    }
    .into()
}

fn peer_http_err(peer: &PeerInfo, status: u16) -> Error {
    peer_err_msg(peer, &format!("HTTP {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> PeerInfo {
        PeerInfo {
            host: "192.168.1.20".into(),
            port: 9876,
            machine_id: "m".into(),
            release: "10".into(),
            arch: "x86_64".into(),
            last_seen: 0,
            blacklisted: false,
            development_mode: false,
            served_media: vec![],
        }
    }

    #[test]
    fn artifact_url_shape() {
        assert_eq!(
            PeerClient::artifact_url(&peer(), "core_release", "jq-1.7-1.x86_64.rpm"),
            "http://192.168.1.20:9876/media/core_release/jq-1.7-1.x86_64.rpm"
        );
    }

    #[test]
    fn have_request_round_trips() {
        let req = HaveRequest {
            files: vec!["x-1.rpm".into()],
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: HaveRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.files, req.files);
    }
}
