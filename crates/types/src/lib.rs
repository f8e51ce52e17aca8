#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core types shared across the urpm crates
//!
//! Identity (NEVRA), version ordering (EVR), capability expressions,
//! and the serializable models for media, servers, peers and history.

pub mod capability;
pub mod history;
pub mod media;
pub mod nevra;
pub mod package;
pub mod peer;
pub mod version;

pub use capability::{CapOp, Capability};
pub use history::{
    HistoryAction, HistoryEntry, HistoryPackage, HistoryStatus, PackageDirection,
};
pub use media::{IpMode, MediaInfo, MediaSyncState, ReplicationPolicy, ServerInfo};
pub use nevra::Nevra;
pub use package::{DepKind, InstalledPackage, PackageFile, PackageMeta};
pub use peer::{Announcement, PeerInfo};
pub use version::{rpm_vercmp, Evr};
