//! Transaction engine error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum TransactionError {
    #[error("download failed for {nevra}: {message}")]
    DownloadFailed { nevra: String, message: String },

    #[error("RPM transaction failed: {message}")]
    RpmFailed { message: String },

    #[error("another transaction is in progress")]
    Locked,

    /// Rollback stops at the step that needs this package; earlier steps
    /// stay applied.
    #[error("package {nevra} is no longer available from any media")]
    NevraUnavailable { nevra: String },

    #[error("history entry {id} cannot be undone: {reason}")]
    NotUndoable { id: i64, reason: String },

    #[error("transaction cancelled")]
    Cancelled,

    #[error("disk full while writing {path}")]
    DiskFull { path: String },
}

impl UserFacingError for TransactionError {
    fn user_message(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Locked => Some("Wait for the other urpm instance to finish."),
            Self::RpmFailed { .. } => Some("Run rpm --verify to check database consistency."),
            Self::DiskFull { .. } => Some("Free disk space, then retry (urpm cache clean)."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::DownloadFailed { .. } | Self::Locked)
    }

    fn user_code(&self) -> Option<&'static str> {
        Some(match self {
            Self::DownloadFailed { .. } => "transaction.download-failed",
            Self::RpmFailed { .. } => "transaction.rpm-failed",
            Self::Locked => "transaction.locked",
            Self::NevraUnavailable { .. } => "transaction.nevra-unavailable",
            Self::NotUndoable { .. } => "transaction.not-undoable",
            Self::Cancelled => "transaction.cancelled",
            Self::DiskFull { .. } => "transaction.disk-full",
        })
    }
}
