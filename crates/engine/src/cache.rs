//! Package cache eviction
//!
//! Quota-only, never time-based. Two phases when a media is over quota:
//! first files whose NEVRA has left the current synthesis (unambiguously
//! stale), then oldest-access-first among files whose package is already
//! installed (reacquirable). Held packages are never evicted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use urpm_errors::Error;
use urpm_events::{Event, EventSender, EventSenderExt};
use urpm_store::Catalog;
use urpm_types::Nevra;

/// Eviction driver; the only deleter of cache files
pub struct CacheEvictor {
    pub catalog: Catalog,
    pub cache_dir: PathBuf,
    pub tx: EventSender,
}

/// One eviction round's result
#[derive(Debug, Default, Clone)]
pub struct EvictionOutcome {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

struct CacheFile {
    path: PathBuf,
    nevra: String,
    size: u64,
    accessed: std::time::SystemTime,
}

impl CacheEvictor {
    /// Enforce the quota of every media that sets one.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read; per-file deletion
    /// failures are logged and skipped.
    pub async fn enforce_quotas(
        &self,
        installed: &[String],
    ) -> Result<EvictionOutcome, Error> {
        let mut total = EvictionOutcome::default();
        let holds: HashSet<String> =
            self.catalog.holds().await?.into_iter().map(|(n, _)| n).collect();
        let installed: HashSet<&str> = installed.iter().map(String::as_str).collect();

        for media in self.catalog.list_media().await? {
            if media.quota_bytes <= 0 {
                continue;
            }
            let outcome = self
                .enforce_one(&media.short_id, media.id, media.quota_bytes, &holds, &installed)
                .await?;
            if outcome.files_removed > 0 {
                self.tx.emit(Event::CacheEvicted {
                    media: media.name.clone(),
                    files: outcome.files_removed,
                    bytes: outcome.bytes_freed,
                });
            }
            total.files_removed += outcome.files_removed;
            total.bytes_freed += outcome.bytes_freed;
        }
        Ok(total)
    }

    async fn enforce_one(
        &self,
        short_id: &str,
        media_id: i64,
        quota: i64,
        holds: &HashSet<String>,
        installed: &HashSet<&str>,
    ) -> Result<EvictionOutcome, Error> {
        let dir = self.cache_dir.join(short_id);
        let mut files = scan_cache_dir(&dir).await?;
        let used: u64 = files.iter().map(|f| f.size).sum();
        #[allow(clippy::cast_sign_loss)]
        let quota = quota as u64;
        if used <= quota {
            return Ok(EvictionOutcome::default());
        }

        let current: HashSet<String> = self
            .catalog
            .nevras_for_media(media_id)
            .await?
            .into_iter()
            .collect();

        let mut outcome = EvictionOutcome::default();
        let mut used = used;

        // Phase 1: files whose NEVRA left the synthesis
        let mut keep = Vec::new();
        for file in files.drain(..) {
            let held = holds.contains(&Nevra::parse(&file.nevra).name);
            if !held && !current.contains(&file.nevra) && used > quota {
                used = used.saturating_sub(file.size);
                outcome.bytes_freed += file.size;
                outcome.files_removed += 1;
                debug!(path = %file.path.display(), "evicting stale cache file");
                let _ = tokio::fs::remove_file(&file.path).await;
            } else {
                keep.push(file);
            }
        }

        // Phase 2: oldest-access-first among already-installed files
        if used > quota {
            keep.sort_by_key(|f| f.accessed);
            for file in &keep {
                if used <= quota {
                    break;
                }
                let held = holds.contains(&Nevra::parse(&file.nevra).name);
                if held || !installed.contains(file.nevra.as_str()) {
                    continue;
                }
                used = used.saturating_sub(file.size);
                outcome.bytes_freed += file.size;
                outcome.files_removed += 1;
                debug!(path = %file.path.display(), "evicting reacquirable cache file");
                let _ = tokio::fs::remove_file(&file.path).await;
            }
        }

        info!(
            short_id,
            removed = outcome.files_removed,
            freed = outcome.bytes_freed,
            "cache quota enforced"
        );
        Ok(outcome)
    }
}

async fn scan_cache_dir(dir: &Path) -> Result<Vec<CacheFile>, Error> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(Error::io_with_path(&e, dir)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?
    {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(nevra) = name.strip_suffix(".rpm") else {
            continue; // part files and strays are not eviction's business
        };
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        files.push(CacheFile {
            nevra: nevra.to_string(),
            size: meta.len(),
            accessed: meta
                .accessed()
                .or_else(|_| meta.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            path,
        });
    }
    Ok(files)
}
