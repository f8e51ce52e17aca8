//! Media synchronization
//!
//! Fetches synthesis (and the file index when the media wants it) from
//! the media's servers and runs the differential import. Synthesis is
//! authoritative for package records; the hdlist is consulted only for
//! file lists when a media publishes no files.xml.

use std::sync::Arc;

use tracing::{info, warn};
use urpm_errors::{Error, NetworkError};
use urpm_events::{Event, EventSender, EventSenderExt};
use urpm_net::{MirrorSelector, NetClient};
use urpm_store::Catalog;
use urpm_types::MediaInfo;

/// Well-known metadata file names below a media's path
const SYNTHESIS_NAME: &str = "media_info/synthesis.hdlist.cz";
const FILES_NAME: &str = "media_info/files.xml.lzma";
const HDLIST_NAME: &str = "media_info/hdlist.cz";

/// Media refresh driver
pub struct MediaSync {
    pub catalog: Catalog,
    pub net: NetClient,
    pub selector: Arc<MirrorSelector>,
    pub tx: EventSender,
}

/// Row-change outcome of one media refresh
#[derive(Debug, Default, Clone)]
pub struct SyncOutcome {
    pub packages_deleted: u64,
    pub packages_inserted: u64,
    pub files_deleted: u64,
    pub files_inserted: u64,
}

impl MediaSync {
    /// Refresh one media by name.
    ///
    /// # Errors
    ///
    /// Returns an error when no server can deliver the synthesis or the
    /// import fails; the catalog keeps its previous state either way.
    pub async fn refresh(&self, media_name: &str) -> Result<SyncOutcome, Error> {
        let media = self.catalog.media_by_name(media_name).await?;
        self.tx.emit(Event::SyncStarted {
            media: media.name.clone(),
        });

        let result = self.refresh_inner(&media).await;
        match &result {
            Ok(outcome) => {
                info!(media = %media.name, ?outcome, "media refresh complete");
                self.tx.emit(Event::SyncCompleted {
                    media: media.name.clone(),
                    packages: usize::try_from(outcome.packages_inserted).unwrap_or(0),
                });
            }
            Err(e) => {
                self.tx.emit(Event::SyncFailed {
                    media: media.name.clone(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// Refresh every enabled media, continuing past per-media failures.
    ///
    /// # Errors
    ///
    /// Returns the first error only if every media failed.
    pub async fn refresh_all(&self) -> Result<Vec<(String, SyncOutcome)>, Error> {
        let media = self.catalog.list_media().await?;
        let mut outcomes = Vec::new();
        let mut first_err = None;

        for m in media.into_iter().filter(|m| m.enabled) {
            match self.refresh(&m.name).await {
                Ok(outcome) => outcomes.push((m.name, outcome)),
                Err(e) => {
                    warn!(media = %m.name, error = %e, "media refresh failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        if outcomes.is_empty() {
            if let Some(e) = first_err {
                return Err(e);
            }
        }
        Ok(outcomes)
    }

    async fn refresh_inner(&self, media: &MediaInfo) -> Result<SyncOutcome, Error> {
        let mut outcome = SyncOutcome::default();

        let synthesis = self.fetch_metadata(media, SYNTHESIS_NAME).await?;
        self.tx.emit(Event::SyncMetadataFetched {
            media: media.name.clone(),
            kind: "synthesis".into(),
            bytes: synthesis.len() as u64,
        });

        let imported = self
            .catalog
            .synthesis_import(media.id)
            .run(&synthesis)
            .await?;
        self.tx.emit(Event::SyncDiffComputed {
            media: media.name.clone(),
            added: usize::try_from(imported.inserted).unwrap_or(0),
            removed: usize::try_from(imported.deleted).unwrap_or(0),
            unchanged: imported.unchanged,
        });
        outcome.packages_deleted = imported.deleted;
        outcome.packages_inserted = imported.inserted;

        if media.sync_files {
            // files.xml preferred; hdlist only as the file-list fallback
            let blob = match self.fetch_metadata(media, FILES_NAME).await {
                Ok(blob) => Some(blob),
                Err(_) => match self.fetch_metadata(media, HDLIST_NAME).await {
                    Ok(hdlist_blob) => Some(hdlist_to_files_blob(&hdlist_blob)?),
                    Err(e) => {
                        warn!(media = %media.name, error = %e, "no file index available");
                        None
                    }
                },
            };

            if let Some(blob) = blob {
                let files = self.catalog.import_files_blob(media.id, &blob).await?;
                outcome.files_deleted = files.deleted;
                outcome.files_inserted = files.inserted;
            }
        }

        Ok(outcome)
    }

    /// Fetch one metadata file through the media's servers with
    /// failover.
    async fn fetch_metadata(&self, media: &MediaInfo, file_name: &str) -> Result<Vec<u8>, Error> {
        let servers = self.catalog.servers_for_media(media.id).await?;
        if servers.is_empty() {
            return Err(NetworkError::NoServerAvailable {
                media: media.name.clone(),
            }
            .into());
        }

        let mut last_err: Option<Error> = None;
        for server in self.selector.order(&servers) {
            let url = MirrorSelector::file_url(&server, &media.relative_path, file_name);
            match self.net.get(&url).await {
                Ok(response) if response.status().is_success() => {
                    match response.bytes().await {
                        Ok(bytes) => {
                            self.selector.record(server.id, true);
                            return Ok(bytes.to_vec());
                        }
                        Err(e) => {
                            self.selector.record(server.id, false);
                            last_err =
                                Some(NetworkError::DownloadFailed(e.to_string()).into());
                        }
                    }
                }
                Ok(response) => {
                    self.selector.record(server.id, false);
                    last_err = Some(
                        NetworkError::HttpError {
                            status: response.status().as_u16(),
                            message: url.clone(),
                        }
                        .into(),
                    );
                }
                Err(e) => {
                    self.selector.record(server.id, false);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            NetworkError::NoServerAvailable {
                media: media.name.clone(),
            }
            .into()
        }))
    }
}

/// Render an hdlist's file lists as a files.xml blob so both paths feed
/// one importer.
fn hdlist_to_files_blob(hdlist_blob: &[u8]) -> Result<Vec<u8>, Error> {
    let entries = urpm_metadata::parse_hdlist(hdlist_blob)?;
    let mut xml = String::from("<media_files>\n");
    for entry in entries {
        let nevra = entry.package.nevra.to_string();
        xml.push_str(&format!("<files fn=\"{nevra}\">"));
        for (i, file) in entry.files.iter().enumerate() {
            if i > 0 {
                xml.push('\n');
            }
            if file.dir == "/" {
                xml.push_str(&format!("/{}", file.basename));
            } else {
                xml.push_str(&format!("{}/{}", file.dir, file.basename));
            }
        }
        xml.push_str("</files>\n");
    }
    xml.push_str("</media_files>");
    Ok(xml.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use urpm_types::{Nevra, PackageFile, PackageMeta};

    #[test]
    fn hdlist_files_render_as_xml() {
        let nevra = Nevra::new("bash", 0, "5.2", "1", "x86_64");
        let entry = urpm_metadata::HdlistEntry {
            package: PackageMeta::new(nevra.clone()),
            files: vec![
                PackageFile::from_path(&nevra.to_string(), "/bin/bash"),
                PackageFile::from_path(&nevra.to_string(), "/usr/share/doc/README"),
            ],
        };
        let blob = urpm_metadata::hdlist::write_header(&entry);
        let xml = hdlist_to_files_blob(&blob).unwrap();
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains("fn=\"bash-5.2-1.x86_64\""));
        assert!(text.contains("/bin/bash"));
    }
}
