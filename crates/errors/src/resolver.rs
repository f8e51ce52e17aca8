//! Resolver error types
//!
//! Resolver failures are structured data: the CLI renders them, the daemon
//! returns them as JSON, and nothing in this crate retries them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ResolverError {
    #[error("cannot satisfy {job}: {}", chain.join(" <- "))]
    Unsatisfiable { job: String, chain: Vec<String> },

    #[error("conflicting packages: {}", packages.join(", "))]
    Conflicting { packages: Vec<String> },

    #[error("held package {package} would be obsoleted by {by}")]
    HeldObsoleted { package: String, by: String },

    #[error("package {name} is blacklisted")]
    Blacklisted { name: String },

    #[error("no package provides {capability}")]
    NoProvider { capability: String },

    #[error("unknown package: {name}")]
    UnknownPackage { name: String },

    #[error("resolution cancelled")]
    Cancelled,
}
