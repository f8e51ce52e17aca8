//! Package record queries

use sqlx::{query, Row, Sqlite, Transaction};
use urpm_errors::{Error, StateError};
use urpm_types::{CapOp, Capability, DepKind, Evr, Nevra, PackageMeta};

use crate::Catalog;

/// A catalog package row with its media
#[derive(Debug, Clone)]
pub struct CatalogPackage {
    pub id: i64,
    pub media_id: i64,
    pub meta: PackageMeta,
}

fn cap_to_columns(cap: &Capability) -> (String, &'static str, String) {
    let op = match cap.op {
        CapOp::None => "",
        CapOp::Eq => "==",
        CapOp::Lt => "<",
        CapOp::Le => "<=",
        CapOp::Gt => ">",
        CapOp::Ge => ">=",
    };
    (
        cap.name.clone(),
        op,
        cap.evr.as_ref().map(ToString::to_string).unwrap_or_default(),
    )
}

fn columns_to_cap(name: String, op: &str, evr: &str) -> Capability {
    match CapOp::parse(op) {
        Some(op) if !evr.is_empty() => Capability::versioned(name, op, Evr::parse(evr)),
        _ => Capability::unversioned(name),
    }
}

async fn load_deps(
    tx: impl sqlx::Executor<'_, Database = Sqlite>,
    package_id: i64,
    meta: &mut PackageMeta,
) -> Result<(), Error> {
    let rows = query(
        "SELECT kind, cap_name, cap_op, cap_evr FROM package_deps WHERE package_id = ?1",
    )
    .bind(package_id)
    .fetch_all(tx)
    .await?;

    for row in rows {
        let Some(kind) = DepKind::parse(row.get("kind")) else {
            continue;
        };
        let cap = columns_to_cap(
            row.get("cap_name"),
            row.get("cap_op"),
            row.get("cap_evr"),
        );
        meta.deps_mut(kind).push(cap);
    }
    Ok(())
}

fn row_to_meta(row: &sqlx::sqlite::SqliteRow) -> PackageMeta {
    #[allow(clippy::cast_sign_loss)]
    let epoch = row.get::<i64, _>("epoch") as u32;
    let nevra = Nevra::new(
        row.get::<String, _>("name"),
        epoch,
        row.get::<String, _>("version"),
        row.get::<String, _>("release"),
        row.get::<String, _>("arch"),
    );
    let mut meta = PackageMeta::new(nevra);
    meta.summary = row.get("summary");
    meta.group = row.get("grp");
    #[allow(clippy::cast_sign_loss)]
    {
        meta.size = row.get::<i64, _>("size") as u64;
        meta.file_size = row.get::<Option<i64>, _>("file_size").map(|v| v as u64);
    }
    meta.description = row.get("description");
    meta.license = row.get("license");
    meta.url = row.get("url");
    meta.digest = row.get("digest");
    meta
}

/// Insert one package row and its capability lists inside an open
/// transaction. Used by the importer.
pub(crate) async fn insert_package(
    tx: &mut Transaction<'_, Sqlite>,
    media_id: i64,
    meta: &PackageMeta,
) -> Result<i64, Error> {
    #[allow(clippy::cast_possible_wrap)]
    let result = query(
        "INSERT OR REPLACE INTO packages \
         (media_id, nevra, name, epoch, version, release, arch, summary, grp, size, \
          file_size, description, license, url, digest) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )
    .bind(media_id)
    .bind(meta.nevra.to_string())
    .bind(&meta.nevra.name)
    .bind(i64::from(meta.nevra.epoch))
    .bind(&meta.nevra.version)
    .bind(&meta.nevra.release)
    .bind(&meta.nevra.arch)
    .bind(&meta.summary)
    .bind(&meta.group)
    .bind(meta.size as i64)
    .bind(meta.file_size.map(|v| v as i64))
    .bind(&meta.description)
    .bind(&meta.license)
    .bind(&meta.url)
    .bind(&meta.digest)
    .execute(&mut **tx)
    .await?;

    let package_id = result.last_insert_rowid();

    for kind in DepKind::ALL {
        for cap in meta.deps(kind) {
            let (name, op, evr) = cap_to_columns(cap);
            query(
                "INSERT INTO package_deps (package_id, kind, cap_name, cap_op, cap_evr) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(package_id)
            .bind(kind.as_str())
            .bind(name)
            .bind(op)
            .bind(evr)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(package_id)
}

/// Delete packages of a media by NEVRA inside an open transaction.
/// Dependency and file rows cascade; the FTS index follows via trigger.
pub(crate) async fn delete_packages(
    tx: &mut Transaction<'_, Sqlite>,
    media_id: i64,
    nevras: &[String],
) -> Result<u64, Error> {
    let mut deleted = 0;
    for nevra in nevras {
        let result = query("DELETE FROM packages WHERE media_id = ?1 AND nevra = ?2")
            .bind(media_id)
            .bind(nevra)
            .execute(&mut **tx)
            .await?;
        query("DELETE FROM package_files WHERE media_id = ?1 AND nevra = ?2")
            .bind(media_id)
            .bind(nevra)
            .execute(&mut **tx)
            .await?;
        deleted += result.rows_affected();
    }
    Ok(deleted)
}

impl Catalog {
    /// NEVRA set currently stored for a media
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn nevras_for_media(&self, media_id: i64) -> Result<Vec<String>, Error> {
        let rows = query("SELECT nevra FROM packages WHERE media_id = ?1")
            .bind(media_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(|r| r.get("nevra")).collect())
    }

    /// All candidate packages by exact name, newest EVR first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn packages_by_name(&self, name: &str) -> Result<Vec<CatalogPackage>, Error> {
        let rows = query("SELECT * FROM packages WHERE name = ?1")
            .bind(name)
            .fetch_all(self.pool())
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut meta = row_to_meta(row);
            let id: i64 = row.get("id");
            load_deps(self.pool(), id, &mut meta).await?;
            out.push(CatalogPackage {
                id,
                media_id: row.get("media_id"),
                meta,
            });
        }
        out.sort_by(|a, b| b.meta.nevra.evr().cmp(&a.meta.nevra.evr()));
        Ok(out)
    }

    /// One package by exact NEVRA string (any media)
    ///
    /// # Errors
    ///
    /// Returns `StateError::PackageNotFound` when absent.
    pub async fn package_by_nevra(&self, nevra: &str) -> Result<CatalogPackage, Error> {
        let row = query("SELECT * FROM packages WHERE nevra = ?1 LIMIT 1")
            .bind(nevra)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StateError::PackageNotFound {
                name: nevra.to_string(),
            })?;
        let mut meta = row_to_meta(&row);
        let id: i64 = row.get("id");
        load_deps(self.pool(), id, &mut meta).await?;
        Ok(CatalogPackage {
            id,
            media_id: row.get("media_id"),
            meta,
        })
    }

    /// Packages whose provides include a capability with this name
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn packages_providing(&self, cap_name: &str) -> Result<Vec<CatalogPackage>, Error> {
        self.packages_by_dep(cap_name, DepKind::Provides).await
    }

    /// Packages whose dependency list of `kind` names this capability
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn packages_by_dep(
        &self,
        cap_name: &str,
        kind: DepKind,
    ) -> Result<Vec<CatalogPackage>, Error> {
        let rows = query(
            "SELECT DISTINCT p.* FROM packages p \
             JOIN package_deps d ON d.package_id = p.id \
             WHERE d.cap_name = ?1 AND d.kind = ?2",
        )
        .bind(cap_name)
        .bind(kind.as_str())
        .fetch_all(self.pool())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut meta = row_to_meta(row);
            let id: i64 = row.get("id");
            load_deps(self.pool(), id, &mut meta).await?;
            out.push(CatalogPackage {
                id,
                media_id: row.get("media_id"),
                meta,
            });
        }
        Ok(out)
    }

    /// Substring search over package names and summaries
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn search_packages(&self, pattern: &str) -> Result<Vec<CatalogPackage>, Error> {
        let like = format!("%{}%", pattern.replace('%', ""));
        let rows = query(
            "SELECT * FROM packages WHERE name LIKE ?1 OR summary LIKE ?1 ORDER BY name",
        )
        .bind(&like)
        .fetch_all(self.pool())
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut meta = row_to_meta(row);
            let id: i64 = row.get("id");
            load_deps(self.pool(), id, &mut meta).await?;
            out.push(CatalogPackage {
                id,
                media_id: row.get("media_id"),
                meta,
            });
        }
        Ok(out)
    }

    /// Every package of every enabled media (resolver pool input)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn all_available(&self) -> Result<Vec<CatalogPackage>, Error> {
        let rows = query(
            "SELECT p.* FROM packages p \
             JOIN media m ON m.id = p.media_id WHERE m.enabled = 1",
        )
        .fetch_all(self.pool())
        .await?;

        // Load capability lists in one sweep instead of per package
        let mut by_id: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.get("id");
            by_id.insert(id, out.len());
            out.push(CatalogPackage {
                id,
                media_id: row.get("media_id"),
                meta: row_to_meta(row),
            });
        }

        let dep_rows = query(
            "SELECT d.package_id, d.kind, d.cap_name, d.cap_op, d.cap_evr \
             FROM package_deps d \
             JOIN packages p ON p.id = d.package_id \
             JOIN media m ON m.id = p.media_id WHERE m.enabled = 1",
        )
        .fetch_all(self.pool())
        .await?;

        for row in dep_rows {
            let package_id: i64 = row.get("package_id");
            let Some(&idx) = by_id.get(&package_id) else {
                continue;
            };
            let Some(kind) = DepKind::parse(row.get("kind")) else {
                continue;
            };
            let cap = columns_to_cap(
                row.get("cap_name"),
                row.get("cap_op"),
                row.get("cap_evr"),
            );
            out[idx].meta.deps_mut(kind).push(cap);
        }

        Ok(out)
    }
}
