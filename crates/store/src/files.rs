//! Package file rows and the file-search index
//!
//! The FTS table is external-content over `package_files` with a
//! trigram tokenizer; triggers keep it in lockstep with every row
//! change, so consistency holds transactionally. Bulk import is the one
//! path allowed to drop and rebuild it.

use sqlx::{query, Row, Sqlite, Transaction};
use urpm_errors::Error;
use urpm_types::PackageFile;

use crate::Catalog;

/// A file-search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHit {
    pub media_id: i64,
    pub nevra: String,
    pub dir: String,
    pub basename: String,
}

pub(crate) async fn insert_files(
    tx: &mut Transaction<'_, Sqlite>,
    media_id: i64,
    files: &[PackageFile],
) -> Result<u64, Error> {
    let mut inserted = 0;
    for file in files {
        let result = query(
            "INSERT OR IGNORE INTO package_files (media_id, nevra, dir_path, basename) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(media_id)
        .bind(&file.nevra)
        .bind(&file.dir)
        .bind(&file.basename)
        .execute(&mut **tx)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Delete the file rows of departed NEVRAs. The FTS delete trigger
/// fires per row inside the same transaction.
pub(crate) async fn delete_file_rows(
    tx: &mut Transaction<'_, Sqlite>,
    media_id: i64,
    nevras: &[String],
) -> Result<u64, Error> {
    let mut deleted = 0;
    for nevra in nevras {
        let result = query("DELETE FROM package_files WHERE media_id = ?1 AND nevra = ?2")
            .bind(media_id)
            .bind(nevra)
            .execute(&mut **tx)
            .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

impl Catalog {
    /// Exact lookup by basename
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn files_by_basename(&self, basename: &str) -> Result<Vec<FileHit>, Error> {
        let rows = query(
            "SELECT media_id, nevra, dir_path, basename FROM package_files \
             WHERE basename = ?1",
        )
        .bind(basename)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .iter()
            .map(|r| FileHit {
                media_id: r.get("media_id"),
                nevra: r.get("nevra"),
                dir: r.get("dir_path"),
                basename: r.get("basename"),
            })
            .collect())
    }

    /// Exact lookup by full path
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn files_by_path(&self, path: &str) -> Result<Vec<FileHit>, Error> {
        let file = PackageFile::from_path("", path);
        let rows = query(
            "SELECT media_id, nevra, dir_path, basename FROM package_files \
             WHERE dir_path = ?1 AND basename = ?2",
        )
        .bind(&file.dir)
        .bind(&file.basename)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .iter()
            .map(|r| FileHit {
                media_id: r.get("media_id"),
                nevra: r.get("nevra"),
                dir: r.get("dir_path"),
                basename: r.get("basename"),
            })
            .collect())
    }

    /// Wildcard search over (directory, basename). Substrings of three
    /// characters or more go through the trigram index; shorter
    /// patterns fall back to a LIKE scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn search_files(&self, pattern: &str, limit: i64) -> Result<Vec<FileHit>, Error> {
        let needle = pattern.trim_matches('*');
        let rows = if needle.len() >= 3 && !needle.contains(['"', '\'']) {
            query(
                "SELECT pf.media_id, pf.nevra, pf.dir_path, pf.basename \
                 FROM package_files_fts f \
                 JOIN package_files pf ON pf.id = f.rowid \
                 WHERE package_files_fts MATCH ?1 LIMIT ?2",
            )
            .bind(format!("\"{needle}\""))
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        } else {
            let like = format!("%{needle}%");
            query(
                "SELECT media_id, nevra, dir_path, basename FROM package_files \
                 WHERE basename LIKE ?1 LIMIT ?2",
            )
            .bind(&like)
            .bind(limit)
            .fetch_all(self.pool())
            .await?
        };

        Ok(rows
            .iter()
            .map(|r| FileHit {
                media_id: r.get("media_id"),
                nevra: r.get("nevra"),
                dir: r.get("dir_path"),
                basename: r.get("basename"),
            })
            .collect())
    }

    /// File rows of one package
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn files_of_package(&self, nevra: &str) -> Result<Vec<FileHit>, Error> {
        let rows = query(
            "SELECT media_id, nevra, dir_path, basename FROM package_files \
             WHERE nevra = ?1 ORDER BY dir_path, basename",
        )
        .bind(nevra)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .iter()
            .map(|r| FileHit {
                media_id: r.get("media_id"),
                nevra: r.get("nevra"),
                dir: r.get("dir_path"),
                basename: r.get("basename"),
            })
            .collect())
    }

    /// Row count of the file table (consistency checks, `cache stats`)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn file_row_count(&self, media_id: i64) -> Result<i64, Error> {
        let row = query("SELECT COUNT(*) AS n FROM package_files WHERE media_id = ?1")
            .bind(media_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.get("n"))
    }

    /// Rebuild the file-search index from the content table.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild statement fails.
    pub async fn rebuild_fts(&self) -> Result<(), Error> {
        query("INSERT INTO package_files_fts(package_files_fts) VALUES('rebuild')")
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Verify the FTS index covers exactly the file table's rowids.
    /// Used by `cache rebuild` and the test suite.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn fts_consistent(&self) -> Result<bool, Error> {
        let missing = query(
            "SELECT COUNT(*) AS n FROM package_files pf \
             WHERE pf.id NOT IN (SELECT rowid FROM package_files_fts)",
        )
        .fetch_one(self.pool())
        .await?;
        let extra = query(
            "SELECT COUNT(*) AS n FROM package_files_fts f \
             WHERE f.rowid NOT IN (SELECT id FROM package_files)",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(missing.get::<i64, _>("n") == 0 && extra.get::<i64, _>("n") == 0)
    }
}
