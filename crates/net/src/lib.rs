#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for urpm
//!
//! HTTP client with retry and per-chunk inactivity timeouts, resumable
//! verified downloads, the peer-cooperation client, and mirror
//! selection with failover.

mod client;
mod download;
mod mirror;
mod peer;

pub use client::{NetClient, NetConfig};
pub use download::{file_sha256, Download, DownloadResult};
pub use mirror::MirrorSelector;
pub use peer::{HaveRequest, HaveResponse, PeerClient};
