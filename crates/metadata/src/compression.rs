//! Transparent decompression for repository metadata
//!
//! Media publish metadata as zstd (current), xz, gzip or bzip2 (legacy),
//! or uncompressed. The format is decided by a leading magic-byte probe;
//! file extensions are untrusted.

use std::io::Read;

use urpm_errors::{Error, MetadataError};

const MAGIC_ZSTD: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const MAGIC_XZ: [u8; 6] = [0xfd, b'7', b'z', b'X', b'Z', 0x00];
const MAGIC_GZIP: [u8; 2] = [0x1f, 0x8b];
const MAGIC_BZ2: [u8; 2] = [b'B', b'Z'];

/// Closed set of codecs a metadata blob may be wrapped in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Zstd,
    Xz,
    Gzip,
    Bzip2,
    Plain,
}

impl Codec {
    /// Decide the codec from the first bytes of a blob
    #[must_use]
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(&MAGIC_ZSTD) {
            Self::Zstd
        } else if head.starts_with(&MAGIC_XZ) {
            Self::Xz
        } else if head.starts_with(&MAGIC_GZIP) {
            Self::Gzip
        } else if head.starts_with(&MAGIC_BZ2) {
            Self::Bzip2
        } else {
            Self::Plain
        }
    }

    /// Decompress a whole blob with this codec.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::DecompressFailed` on a truncated or
    /// corrupt stream.
    pub fn read_all(self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(data.len() * 4);
        let result = match self {
            Self::Zstd => zstd::stream::read::Decoder::new(data)
                .and_then(|mut d| d.read_to_end(&mut out)),
            Self::Xz => xz2::read::XzDecoder::new(data).read_to_end(&mut out),
            Self::Gzip => flate2::read::MultiGzDecoder::new(data).read_to_end(&mut out),
            Self::Bzip2 => bzip2::read::BzDecoder::new(data).read_to_end(&mut out),
            Self::Plain => {
                return Ok(data.to_vec());
            }
        };
        match result {
            Ok(_) => Ok(out),
            Err(e) => Err(MetadataError::DecompressFailed(e.to_string()).into()),
        }
    }
}

/// Probe and decompress in one step.
///
/// # Errors
///
/// Propagates decoder failures as `MetadataError::DecompressFailed`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, Error> {
    Codec::detect(data).read_all(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_by_magic_not_extension() {
        assert_eq!(Codec::detect(&[0x28, 0xb5, 0x2f, 0xfd, 0, 0]), Codec::Zstd);
        assert_eq!(
            Codec::detect(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]),
            Codec::Xz
        );
        assert_eq!(Codec::detect(&[0x1f, 0x8b, 0x08]), Codec::Gzip);
        assert_eq!(Codec::detect(b"BZh91AY"), Codec::Bzip2);
        assert_eq!(Codec::detect(b"@provides@foo"), Codec::Plain);
        assert_eq!(Codec::detect(&[]), Codec::Plain);
    }

    #[test]
    fn gzip_round_trip() {
        let payload = b"@info@test-1.0-1.noarch@0@1234@System";
        let mut enc =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(payload).unwrap();
        let compressed = enc.finish().unwrap();

        assert_eq!(decompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn zstd_round_trip() {
        let payload = vec![42u8; 8192];
        let compressed = zstd::stream::encode_all(&payload[..], 3).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn plain_passes_through() {
        let payload = b"not compressed at all";
        assert_eq!(decompress(payload).unwrap(), payload);
    }

    #[test]
    fn corrupt_stream_is_an_error() {
        let mut bad = vec![0x28, 0xb5, 0x2f, 0xfd];
        bad.extend_from_slice(&[0xff; 16]);
        assert!(decompress(&bad).is_err());
    }
}
