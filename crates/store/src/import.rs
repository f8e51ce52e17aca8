//! Differential and bulk metadata import
//!
//! A refresh computes the NEVRA diff between catalog and blob, then
//! deletes `A \ B` and inserts `B \ A` inside a single write
//! transaction. First-ever ingestion takes the bulk path: file-search
//! indexes are dropped, rows are bulk-inserted under relaxed pragmas,
//! then indexes and the FTS table are rebuilt. A mid-stream failure
//! aborts the transaction, leaving catalog and sync state untouched.

use sqlx::query;
use tracing::debug;
use urpm_errors::Error;
use urpm_metadata::{blob_md5, files_xml, parse_synthesis, DiffPlan};
use urpm_types::PackageFile;

use crate::{files, now_epoch, packages, Catalog};

/// Row-change summary of one import
#[derive(Debug, Clone, Default)]
pub struct ImportOutcome {
    pub deleted: u64,
    pub inserted: u64,
    pub unchanged: usize,
    pub bulk: bool,
}

/// Prepared synthesis import for one media
pub struct SynthesisImport<'a> {
    catalog: &'a Catalog,
    media_id: i64,
}

impl Catalog {
    /// Begin a synthesis import for a media
    #[must_use]
    pub fn synthesis_import(&self, media_id: i64) -> SynthesisImport<'_> {
        SynthesisImport {
            catalog: self,
            media_id,
        }
    }

    /// Differential import of a file-index blob. Deletes rows of
    /// departed NEVRAs, streams in rows of new ones, updates the
    /// per-media sync state.
    ///
    /// # Errors
    ///
    /// Any failure rolls the whole transaction back; the previous
    /// catalog contents and sync state stay in place.
    pub async fn import_files_blob(
        &self,
        media_id: i64,
        blob: &[u8],
    ) -> Result<ImportOutcome, Error> {
        let old = self.nevras_with_files(media_id).await?;
        let new = files_xml::scan_nevras(blob)?;
        let plan = DiffPlan::compute(old, new);

        if plan.is_noop() {
            self.touch_sync_state(media_id, None, Some(blob)).await?;
            return Ok(ImportOutcome {
                unchanged: plan.unchanged,
                ..ImportOutcome::default()
            });
        }

        let bulk = plan.is_initial();
        let mut tx = self.pool().begin().await?;

        if bulk {
            // Bulk mode: cheap inserts, index rebuild afterwards
            query("DROP INDEX IF EXISTS idx_pf_basename")
                .execute(&mut *tx)
                .await?;
            query("DROP INDEX IF EXISTS idx_pf_dir_basename")
                .execute(&mut *tx)
                .await?;
            query("DROP TRIGGER IF EXISTS package_files_ai")
                .execute(&mut *tx)
                .await?;
            query("DROP TRIGGER IF EXISTS package_files_ad")
                .execute(&mut *tx)
                .await?;
        }

        let deleted = files::delete_file_rows(&mut tx, media_id, &plan.to_delete).await?;

        let mut inserted = 0u64;
        let mut file_count = 0i64;
        let mut package_count = 0i64;

        // Second pass over the blob: insert only the new NEVRAs
        let mut pending: Vec<(String, Vec<PackageFile>)> = Vec::new();
        files_xml::visit_files(blob, |nevra, file_rows| {
            package_count += 1;
            file_count += i64::try_from(file_rows.len()).unwrap_or(i64::MAX);
            if plan.to_insert.contains(nevra) {
                pending.push((nevra.to_string(), file_rows));
            }
            Ok(())
        })?;

        for (_, file_rows) in &pending {
            inserted += files::insert_files(&mut tx, media_id, file_rows).await?;
        }

        if bulk {
            query(
                "CREATE INDEX IF NOT EXISTS idx_pf_basename ON package_files(basename)",
            )
            .execute(&mut *tx)
            .await?;
            query(
                "CREATE INDEX IF NOT EXISTS idx_pf_dir_basename \
                 ON package_files(dir_path, basename)",
            )
            .execute(&mut *tx)
            .await?;
            query(
                "CREATE TRIGGER IF NOT EXISTS package_files_ai AFTER INSERT ON package_files \
                 BEGIN INSERT INTO package_files_fts(rowid, dir_path, basename) \
                 VALUES (new.id, new.dir_path, new.basename); END",
            )
            .execute(&mut *tx)
            .await?;
            query(
                "CREATE TRIGGER IF NOT EXISTS package_files_ad AFTER DELETE ON package_files \
                 BEGIN INSERT INTO package_files_fts(package_files_fts, rowid, dir_path, basename) \
                 VALUES ('delete', old.id, old.dir_path, old.basename); END",
            )
            .execute(&mut *tx)
            .await?;
            query("INSERT INTO package_files_fts(package_files_fts) VALUES('rebuild')")
                .execute(&mut *tx)
                .await?;
        }

        query(
            "UPDATE media_state SET files_md5 = ?1, file_count = ?2, package_count = ?3, \
             compressed_size = ?4, last_sync = ?5 WHERE media_id = ?6",
        )
        .bind(blob_md5(blob))
        .bind(file_count)
        .bind(package_count)
        .bind(i64::try_from(blob.len()).unwrap_or(i64::MAX))
        .bind(now_epoch())
        .bind(media_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(media_id, deleted, inserted, bulk, "file index import done");
        Ok(ImportOutcome {
            deleted,
            inserted,
            unchanged: plan.unchanged,
            bulk,
        })
    }

    /// NEVRAs that currently have file rows for this media
    async fn nevras_with_files(&self, media_id: i64) -> Result<Vec<String>, Error> {
        use sqlx::Row;
        let rows = query("SELECT DISTINCT nevra FROM package_files WHERE media_id = ?1")
            .bind(media_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(|r| r.get("nevra")).collect())
    }

    async fn touch_sync_state(
        &self,
        media_id: i64,
        synthesis_blob: Option<&[u8]>,
        files_blob: Option<&[u8]>,
    ) -> Result<(), Error> {
        if let Some(blob) = synthesis_blob {
            query("UPDATE media_state SET synthesis_md5 = ?1, last_sync = ?2 WHERE media_id = ?3")
                .bind(blob_md5(blob))
                .bind(now_epoch())
                .bind(media_id)
                .execute(self.pool())
                .await?;
        }
        if let Some(blob) = files_blob {
            query("UPDATE media_state SET files_md5 = ?1, last_sync = ?2 WHERE media_id = ?3")
                .bind(blob_md5(blob))
                .bind(now_epoch())
                .bind(media_id)
                .execute(self.pool())
                .await?;
        }
        Ok(())
    }
}

impl SynthesisImport<'_> {
    /// Run the import against a synthesis blob.
    ///
    /// # Errors
    ///
    /// A parse or database failure aborts the transaction; nothing is
    /// changed and the sync state keeps its previous md5 so the next
    /// refresh retries from scratch.
    pub async fn run(self, blob: &[u8]) -> Result<ImportOutcome, Error> {
        let state = self.catalog.media_sync_state(self.media_id).await?;
        let md5 = blob_md5(blob);
        if state.synthesis_md5.as_deref() == Some(md5.as_str()) {
            // Unchanged remote: no row changes at all
            return Ok(ImportOutcome::default());
        }

        // Parse fully before touching the database: a corrupt blob must
        // not cost us a transaction abort halfway through
        let records = parse_synthesis(blob)?;

        let old = self.catalog.nevras_for_media(self.media_id).await?;
        let new: Vec<String> = records.iter().map(|p| p.nevra.to_string()).collect();
        let plan = DiffPlan::compute(old, new);

        if plan.is_noop() {
            self.catalog
                .touch_sync_state(self.media_id, Some(blob), None)
                .await?;
            return Ok(ImportOutcome {
                unchanged: plan.unchanged,
                ..ImportOutcome::default()
            });
        }

        let bulk = plan.is_initial();
        let mut tx = self.catalog.pool().begin().await?;

        let deleted = packages::delete_packages(&mut tx, self.media_id, &plan.to_delete).await?;

        let mut inserted = 0u64;
        for record in &records {
            if plan.to_insert.contains(&record.nevra.to_string()) {
                packages::insert_package(&mut tx, self.media_id, record).await?;
                inserted += 1;
            }
        }

        query(
            "UPDATE media_state SET synthesis_md5 = ?1, package_count = ?2, last_sync = ?3 \
             WHERE media_id = ?4",
        )
        .bind(&md5)
        .bind(i64::try_from(records.len()).unwrap_or(i64::MAX))
        .bind(now_epoch())
        .bind(self.media_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            media_id = self.media_id,
            deleted, inserted, bulk, "synthesis import done"
        );
        Ok(ImportOutcome {
            deleted,
            inserted,
            unchanged: plan.unchanged,
            bulk,
        })
    }
}
