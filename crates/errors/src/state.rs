//! Catalog store error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum StateError {
    #[error("database error: {message}")]
    DatabaseError { message: String },

    #[error("migration failed: {message}")]
    MigrationFailed { message: String },

    #[error("media not found: {name}")]
    MediaNotFound { name: String },

    #[error("media already exists: {name}")]
    MediaExists { name: String },

    #[error("server not found: {name}")]
    ServerNotFound { name: String },

    #[error("package not found: {name}")]
    PackageNotFound { name: String },

    #[error("history entry {id} not found")]
    HistoryNotFound { id: i64 },

    #[error("history entry {id} already in terminal state {status}")]
    HistoryAlreadyTerminal { id: i64, status: String },

    #[error("enabled media {name} has no enabled server")]
    NoServerForMedia { name: String },
}
