//! Artifact acquisition
//!
//! Order per artifact: verified cache hit, then LAN peers (any failure
//! falls through), then the media's servers with priority/success-rate
//! failover. Downloads run on a bounded worker pool; a digest failure
//! deletes the file and retries once before the source is marked
//! unhealthy and another is tried.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};
use urpm_errors::{Error, NetworkError, TransactionError};
use urpm_events::{Event, EventSender, EventSenderExt};
use urpm_net::{file_sha256, Download, MirrorSelector, NetClient, PeerClient};
use urpm_resolver::TransactionItem;
use urpm_store::Catalog;
use urpm_types::{PeerInfo, ServerInfo};

/// Acquisition context shared by the worker pool
pub struct Acquirer {
    pub catalog: Catalog,
    pub net: NetClient,
    pub selector: Arc<MirrorSelector>,
    pub cache_dir: PathBuf,
    pub max_workers: usize,
    pub peer_timeout: Duration,
    pub tx: EventSender,
    pub cancel: Arc<AtomicBool>,
}

/// Where an artifact ended up coming from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Cache,
    Peer { host: String },
    Server { name: String },
}

/// One acquired artifact
#[derive(Debug, Clone)]
pub struct Acquired {
    pub nevra: String,
    pub path: PathBuf,
    pub source: Source,
}

impl Acquirer {
    /// Acquire every artifact of a transaction. Fails on the first
    /// artifact that no source can provide; cancellation is observed
    /// between artifacts and at download suspension points.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::DownloadFailed` naming the artifact
    /// when every source is exhausted, or `Cancelled`.
    pub async fn acquire_all(
        &self,
        items: &[(TransactionItem, String)],
    ) -> Result<Vec<Acquired>, Error> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(items.len());

        for (item, media_short_id) in items {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| Error::Cancelled)?;
            if self.cancel.load(Ordering::Relaxed) {
                return Err(TransactionError::Cancelled.into());
            }

            let item = item.clone();
            let media_short_id = media_short_id.clone();
            let this = self.clone_context();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                this.acquire_one(&item, &media_short_id).await
            }));
        }

        let mut acquired = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(artifact)) => acquired.push(artifact),
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(Error::internal(format!("download task panicked: {e}"))),
            }
        }
        Ok(acquired)
    }

    fn clone_context(&self) -> Self {
        Self {
            catalog: self.catalog.clone(),
            net: self.net.clone(),
            selector: Arc::clone(&self.selector),
            cache_dir: self.cache_dir.clone(),
            max_workers: self.max_workers,
            peer_timeout: self.peer_timeout,
            tx: self.tx.clone(),
            cancel: Arc::clone(&self.cancel),
        }
    }

    /// Acquire one artifact through the source ladder.
    async fn acquire_one(
        &self,
        item: &TransactionItem,
        media_short_id: &str,
    ) -> Result<Acquired, Error> {
        let nevra = item.nevra.to_string();
        let file_name = item.nevra.rpm_file_name();
        let dest = self.cache_dir.join(media_short_id).join(&file_name);

        // 1. verified cache hit
        if self.cache_hit(&dest, item.digest.as_deref()).await {
            debug!(%nevra, "cache hit");
            return Ok(Acquired {
                nevra,
                path: dest,
                source: Source::Cache,
            });
        }

        // 2. peers, best-effort
        if let Some(acquired) = self
            .try_peers(item, media_short_id, &file_name, &dest)
            .await
        {
            return Ok(acquired);
        }

        // 3. media servers with failover
        self.try_servers(item, &file_name, &dest).await
    }

    async fn cache_hit(&self, dest: &Path, digest: Option<&str>) -> bool {
        if tokio::fs::metadata(dest).await.is_err() {
            return false;
        }
        match digest {
            None => true,
            Some(expected) => match file_sha256(dest).await {
                Ok(actual) => {
                    if actual.eq_ignore_ascii_case(expected) {
                        true
                    } else {
                        // Stale or corrupt cache entry
                        let _ = tokio::fs::remove_file(dest).await;
                        false
                    }
                }
                Err(_) => false,
            },
        }
    }

    async fn try_peers(
        &self,
        item: &TransactionItem,
        media_short_id: &str,
        file_name: &str,
        dest: &Path,
    ) -> Option<Acquired> {
        let peers = self.catalog.healthy_peers(180).await.ok()?;
        if peers.is_empty() {
            return None;
        }

        let client = PeerClient::new(self.net.clone(), self.peer_timeout);
        let want = vec![file_name.to_string()];

        for peer in peers {
            if self.cancel.load(Ordering::Relaxed) {
                return None;
            }
            match client.have(&peer, &want).await {
                Ok(response) if response.have.iter().any(|f| f == file_name) => {
                    match self.fetch_from_peer(&peer, item, media_short_id, dest).await {
                        Ok(acquired) => {
                            self.tx.emit(Event::PeerHit {
                                nevra: item.nevra.to_string(),
                                host: peer.host.clone(),
                                port: peer.port,
                            });
                            return Some(acquired);
                        }
                        Err(e) => {
                            // Fall through to the next peer, then upstream
                            debug!(host = %peer.host, error = %e, "peer fetch failed");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(host = %peer.host, error = %e, "peer query failed");
                }
            }
        }
        None
    }

    async fn fetch_from_peer(
        &self,
        peer: &PeerInfo,
        item: &TransactionItem,
        media_short_id: &str,
        dest: &Path,
    ) -> Result<Acquired, Error> {
        let url = PeerClient::artifact_url(peer, media_short_id, &item.nevra.rpm_file_name());
        Download::new(&url)?
            .for_package(item.nevra.to_string())
            .execute(&self.net, dest, item.digest.as_deref(), &self.tx)
            .await?;
        Ok(Acquired {
            nevra: item.nevra.to_string(),
            path: dest.to_path_buf(),
            source: Source::Peer {
                host: peer.host.clone(),
            },
        })
    }

    async fn try_servers(
        &self,
        item: &TransactionItem,
        file_name: &str,
        dest: &Path,
    ) -> Result<Acquired, Error> {
        let media_id = item.media_id.ok_or_else(|| {
            Error::from(TransactionError::DownloadFailed {
                nevra: item.nevra.to_string(),
                message: "artifact has no source media".into(),
            })
        })?;

        let media = self
            .catalog
            .list_media()
            .await?
            .into_iter()
            .find(|m| m.id == media_id)
            .ok_or_else(|| {
                Error::from(TransactionError::DownloadFailed {
                    nevra: item.nevra.to_string(),
                    message: "source media vanished from the catalog".into(),
                })
            })?;

        let servers = self.catalog.servers_for_media(media_id).await?;
        if servers.is_empty() {
            return Err(NetworkError::NoServerAvailable {
                media: media.name.clone(),
            }
            .into());
        }

        let mut last_err: Option<Error> = None;
        for server in self.selector.order(&servers) {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(TransactionError::Cancelled.into());
            }
            match self
                .fetch_from_server(&server, &media.relative_path, item, file_name, dest)
                .await
            {
                Ok(acquired) => {
                    self.selector.record(server.id, true);
                    return Ok(acquired);
                }
                Err(e) => {
                    warn!(server = %server.name, error = %e, "server fetch failed");
                    self.selector.record(server.id, false);
                    last_err = Some(e);
                }
            }
        }

        Err(TransactionError::DownloadFailed {
            nevra: item.nevra.to_string(),
            message: last_err.map_or_else(|| "no source succeeded".into(), |e| e.to_string()),
        }
        .into())
    }

    async fn fetch_from_server(
        &self,
        server: &ServerInfo,
        relative_path: &str,
        item: &TransactionItem,
        file_name: &str,
        dest: &Path,
    ) -> Result<Acquired, Error> {
        let url = MirrorSelector::file_url(server, relative_path, file_name);
        let download = Download::new(&url)?.for_package(item.nevra.to_string());

        match download
            .execute(&self.net, dest, item.digest.as_deref(), &self.tx)
            .await
        {
            Ok(_) => {}
            // One retry after a digest failure; the part file is gone,
            // so this restarts from byte zero
            Err(Error::Network(NetworkError::DigestMismatch { .. })) => {
                Download::new(&url)?
                    .for_package(item.nevra.to_string())
                    .execute(&self.net, dest, item.digest.as_deref(), &self.tx)
                    .await?;
            }
            Err(e) => return Err(e),
        }

        Ok(Acquired {
            nevra: item.nevra.to_string(),
            path: dest.to_path_buf(),
            source: Source::Server {
                name: server.name.clone(),
            },
        })
    }
}
