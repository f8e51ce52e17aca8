//! Metadata ingestion error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum MetadataError {
    /// Decode failure mid-stream. The catalog keeps its previous contents
    /// and the media state row is not advanced.
    #[error("corrupt metadata in media {media} at offset {offset}: {message}")]
    Corrupt {
        media: String,
        offset: u64,
        message: String,
    },

    #[error("unsupported compression format (magic {magic})")]
    UnknownCompression { magic: String },

    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    #[error("truncated header at offset {offset}")]
    TruncatedHeader { offset: u64 },

    #[error("malformed synthesis line {line}: {message}")]
    MalformedLine { line: usize, message: String },

    #[error("invalid NEVRA: {0}")]
    InvalidNevra(String),

    #[error("xml error: {0}")]
    Xml(String),
}
