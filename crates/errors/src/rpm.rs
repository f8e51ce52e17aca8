//! RPM handoff error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum RpmError {
    #[error("rpm database locked by another process")]
    DbLocked,

    #[error("rpm query failed: {message}")]
    QueryFailed { message: String },

    #[error("rpm transaction element rejected: {nevra}: {message}")]
    ElementRejected { nevra: String, message: String },

    #[error("rpm exited with code {code}: {stderr}")]
    ExitFailure { code: i32, stderr: String },

    #[error("rpm binary not found at {path}")]
    BinaryMissing { path: String },
}
