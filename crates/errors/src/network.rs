//! Network-related error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum NetworkError {
    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("digest mismatch for {url}: expected {expected}, got {actual}")]
    DigestMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("no server available for media {media}")]
    NoServerAvailable { media: String },

    #[error("peer {host}:{port} unreachable: {message}")]
    PeerUnreachable {
        host: String,
        port: u16,
        message: String,
    },

    #[error("stalled download from {url}: no data for {seconds}s")]
    Stalled { url: String, seconds: u64 },
}

impl UserFacingError for NetworkError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } | Self::Stalled { .. } | Self::ConnectionRefused(_) => {
                Some("Check your network connection and try again.")
            }
            Self::NoServerAvailable { .. } => {
                Some("Enable at least one server for this media (urpm server list).")
            }
            Self::DigestMismatch { .. } => {
                Some("The mirror may be mid-sync; retry or switch servers.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl(_) | Self::NoServerAvailable { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::Timeout { .. } => "network.timeout",
            Self::DownloadFailed(_) => "network.download-failed",
            Self::ConnectionRefused(_) => "network.connection-refused",
            Self::InvalidUrl(_) => "network.invalid-url",
            Self::HttpError { .. } => "network.http",
            Self::DigestMismatch { .. } => "network.digest-mismatch",
            Self::NoServerAvailable { .. } => "network.no-server",
            Self::PeerUnreachable { .. } => "network.peer-unreachable",
            Self::Stalled { .. } => "network.stalled",
        })
    }
}
