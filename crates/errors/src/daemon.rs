//! Daemon error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum DaemonError {
    #[error("failed to bind {addr}: {message}")]
    BindFailed { addr: String, message: String },

    #[error("another daemon is running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("discovery socket error: {0}")]
    Discovery(String),

    #[error("request not authorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("scheduler task {task} panicked")]
    TaskPanicked { task: String },
}
