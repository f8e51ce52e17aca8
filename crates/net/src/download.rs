//! File download with resume, digest verification and progress events

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;
use urpm_errors::{Error, NetworkError};
use urpm_events::{Event, EventSender, EventSenderExt};

use crate::NetClient;

/// Download operation handle
pub struct Download {
    url: Url,
    nevra: Option<String>,
}

/// Result of a download operation
#[derive(Debug)]
pub struct DownloadResult {
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

impl Download {
    /// Create a new download
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL cannot be parsed.
    pub fn new(url: &str) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
        Ok(Self { url, nevra: None })
    }

    /// Attach the NEVRA this artifact belongs to (progress labelling)
    #[must_use]
    pub fn for_package(mut self, nevra: impl Into<String>) -> Self {
        self.nevra = Some(nevra.into());
        self
    }

    /// Execute the download, resuming from an existing partial file.
    ///
    /// The body streams into `<dest>.part`; on completion the part file
    /// is renamed over `dest`. When `expected_sha256` is given and the
    /// final digest differs, the part file is deleted and the error
    /// reports both digests - the caller owns the retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error on HTTP failure, I/O failure, cancellation at a
    /// suspension point, or digest mismatch.
    pub async fn execute(
        self,
        client: &NetClient,
        dest: &Path,
        expected_sha256: Option<&str>,
        tx: &EventSender,
    ) -> Result<DownloadResult, Error> {
        let url_str = self.url.to_string();

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part_path = dest.with_extension("part");
        let resume_from = match tokio::fs::metadata(&part_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let response = if resume_from > 0 {
            client.get_range(&url_str, resume_from).await?
        } else {
            client.get(&url_str).await?
        };

        // A server that ignores the Range header restarts from zero
        let (mut file, mut downloaded) = if resume_from > 0
            && response.status() == reqwest::StatusCode::PARTIAL_CONTENT
        {
            let file = OpenOptions::new().append(true).open(&part_path).await?;
            (file, resume_from)
        } else {
            if !response.status().is_success() {
                return Err(NetworkError::HttpError {
                    status: response.status().as_u16(),
                    message: response.status().to_string(),
                }
                .into());
            }
            (File::create(&part_path).await?, 0)
        };

        let total = response
            .content_length()
            .map(|len| len + downloaded);

        tx.emit(Event::DownloadStarted {
            url: url_str.clone(),
            nevra: self.nevra.clone(),
            size: total,
            resumed_from: downloaded,
        });

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    Error::from(NetworkError::Stalled {
                        url: url_str.clone(),
                        seconds: 0,
                    })
                } else {
                    NetworkError::DownloadFailed(e.to_string()).into()
                }
            })?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total {
                tx.emit(Event::DownloadProgress {
                    url: url_str.clone(),
                    bytes_downloaded: downloaded,
                    total_bytes: total,
                });
            }
        }

        file.flush().await?;
        drop(file);

        // Digest covers the whole file, including any resumed prefix
        let sha256 = file_sha256(&part_path).await?;

        if let Some(expected) = expected_sha256 {
            if !sha256.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(&part_path).await;
                tx.emit(Event::DownloadFailed {
                    url: url_str.clone(),
                    error: "digest mismatch".into(),
                });
                return Err(NetworkError::DigestMismatch {
                    url: url_str,
                    expected: expected.to_string(),
                    actual: sha256,
                }
                .into());
            }
        }

        tokio::fs::rename(&part_path, dest).await?;

        tx.emit(Event::DownloadCompleted {
            url: url_str.clone(),
            size: downloaded,
        });

        Ok(DownloadResult {
            url: url_str,
            size: downloaded,
            sha256,
        })
    }
}

/// SHA-256 of a file on disk, hex-encoded
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn file_sha256(path: &Path) -> Result<String, Error> {
    let mut file = File::open(path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sha256_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        tokio::fs::write(&path, b"abc").await.unwrap();
        assert_eq!(
            file_sha256(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(Download::new("not a url").is_err());
        assert!(Download::new("https://mirror.example/core/x.rpm").is_ok());
    }
}
