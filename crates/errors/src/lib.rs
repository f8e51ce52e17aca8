#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the urpm package manager
//!
//! This crate provides fine-grained error types organized by domain.
//! Errors cross crate boundaries as typed variants carrying a
//! machine-readable kind plus a human message; only the CLI formats
//! them for humans, and `--json` mode serializes the structured form.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod daemon;
pub mod metadata;
pub mod network;
pub mod resolver;
pub mod rpm;
pub mod state;
pub mod transaction;

pub use config::ConfigError;
pub use daemon::DaemonError;
pub use metadata::MetadataError;
pub use network::NetworkError;
pub use resolver::ResolverError;
pub use rpm::RpmError;
pub use state::StateError;
pub use transaction::TransactionError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("daemon error: {0}")]
    Daemon(#[from] DaemonError),

    #[error("rpm error: {0}")]
    Rpm(#[from] RpmError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        #[serde(with = "io_kind_as_str")]
        kind: std::io::ErrorKind,
        message: String,
        #[serde(with = "opt_path_buf")]
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// CLI exit code for this error: 1 resolver, 2 download, 3 rpm
    /// handoff, 4 usage, 5 permission denied.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Resolver(_) => 1,
            Error::Network(_) | Error::Transaction(TransactionError::DownloadFailed { .. }) => 2,
            Error::Rpm(_) | Error::Transaction(TransactionError::RpmFailed { .. }) => 3,
            Error::Config(_) => 4,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
            | Error::Daemon(DaemonError::Unauthorized(_)) => 5,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::State(StateError::DatabaseError {
            message: err.to_string(),
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

/// Result type alias for urpm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Minimal interface for rendering user-facing error information without
/// requiring heavyweight envelopes.
pub trait UserFacingError {
    /// Short message suitable for CLI output.
    fn user_message(&self) -> Cow<'_, str>;

    /// Optional remediation hint.
    fn user_hint(&self) -> Option<&'static str> {
        None
    }

    /// Whether retrying the same operation is likely to succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Stable error code for structured reporting.
    fn user_code(&self) -> Option<&'static str> {
        None
    }
}

impl UserFacingError for Error {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Error::Network(err) => err.user_message(),
            Error::Transaction(err) => err.user_message(),
            Error::Io { message, .. } => Cow::Owned(message.clone()),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Error::Network(err) => err.user_hint(),
            Error::Transaction(err) => err.user_hint(),
            Error::Config(_) => Some("Check /etc/urpm/urpm.toml."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(err) => err.is_retryable(),
            Error::Transaction(err) => err.is_retryable(),
            Error::Io { .. } => true,
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Error::Network(err) => err.user_code(),
            Error::Transaction(err) => err.user_code(),
            Error::Metadata(_) => Some("error.metadata"),
            Error::State(_) => Some("error.state"),
            Error::Resolver(_) => Some("error.resolver"),
            Error::Config(_) => Some("error.config"),
            Error::Daemon(_) => Some("error.daemon"),
            Error::Rpm(_) => Some("error.rpm"),
            Error::Internal(_) => Some("error.internal"),
            Error::Cancelled => Some("error.cancelled"),
            Error::Io { .. } => Some("error.io"),
        }
    }
}

// Serde helper modules for optional path and io::ErrorKind as string
mod io_kind_as_str {
    use serde::{Deserialize, Deserializer, Serializer};
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(kind: &std::io::ErrorKind, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&format!("{kind:?}"))
    }
    pub fn deserialize<'de, D>(deserializer: D) -> Result<std::io::ErrorKind, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Best effort mapping; default to Other
        Ok(match s.as_str() {
            "NotFound" => std::io::ErrorKind::NotFound,
            "PermissionDenied" => std::io::ErrorKind::PermissionDenied,
            "ConnectionRefused" => std::io::ErrorKind::ConnectionRefused,
            "ConnectionReset" => std::io::ErrorKind::ConnectionReset,
            "BrokenPipe" => std::io::ErrorKind::BrokenPipe,
            "AlreadyExists" => std::io::ErrorKind::AlreadyExists,
            "InvalidInput" => std::io::ErrorKind::InvalidInput,
            "InvalidData" => std::io::ErrorKind::InvalidData,
            "TimedOut" => std::io::ErrorKind::TimedOut,
            "Interrupted" => std::io::ErrorKind::Interrupted,
            "UnexpectedEof" => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::Other,
        })
    }
}

mod opt_path_buf {
    use serde::{Deserialize, Deserializer, Serializer};
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(path: &Option<std::path::PathBuf>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match path {
            Some(pb) => s.serialize_some(&pb.display().to_string()),
            None => s.serialize_none(),
        }
    }
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<std::path::PathBuf>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        Ok(opt.map(std::path::PathBuf::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_contract() {
        let resolver: Error = ResolverError::UnknownPackage {
            name: "nosuch".into(),
        }
        .into();
        assert_eq!(resolver.exit_code(), 1);

        let net: Error = NetworkError::DownloadFailed("boom".into()).into();
        assert_eq!(net.exit_code(), 2);

        let rpm: Error = RpmError::ExitFailure {
            code: 1,
            stderr: String::new(),
        }
        .into();
        assert_eq!(rpm.exit_code(), 3);

        let cfg: Error = ConfigError::ParseError {
            message: "bad".into(),
        }
        .into();
        assert_eq!(cfg.exit_code(), 4);
    }

    #[test]
    fn structured_errors_round_trip_json() {
        let err: Error = MetadataError::Corrupt {
            media: "core".into(),
            offset: 4096,
            message: "magic mismatch".into(),
        }
        .into();
        let json = serde_json::to_string(&err).unwrap();
        let back: Error = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), err.to_string());
    }
}
