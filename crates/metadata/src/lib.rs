#![deny(clippy::pedantic, unsafe_code)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_lossless
)]

//! Repository metadata ingestion for urpm
//!
//! Turns opaque compressed repository files (synthesis, hdlist,
//! files.xml) into package records and file rows, and computes the
//! differential plan that keeps re-syncs cheap.

pub mod compression;
pub mod diff;
pub mod files_xml;
pub mod hdlist;
pub mod synthesis;

pub use compression::{decompress, Codec};
pub use diff::DiffPlan;
pub use hdlist::{parse_hdlist, HdlistEntry};
pub use synthesis::{parse_synthesis, parse_synthesis_str, write_synthesis};

/// MD5 of a raw metadata blob, hex-encoded. Used for change detection
/// against the per-media sync state (the mirror's published checksums
/// are MD5).
#[must_use]
pub fn blob_md5(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_matches_known_vector() {
        // RFC 1321 test vector
        assert_eq!(blob_md5(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
