//! Media and server operations

use sqlx::{query, Row};
use urpm_errors::{Error, StateError};
use urpm_types::{IpMode, MediaInfo, MediaSyncState, ReplicationPolicy, ServerInfo};

use crate::{now_epoch, Catalog};

/// Parameters for creating a media
#[derive(Debug, Clone, Default)]
pub struct NewMedia {
    pub name: String,
    pub short_id: String,
    pub update: bool,
    pub priority: i64,
    pub relative_path: String,
    pub sync_files: bool,
}

fn row_to_media(row: &sqlx::sqlite::SqliteRow) -> MediaInfo {
    MediaInfo {
        id: row.get("id"),
        name: row.get("name"),
        short_id: row.get("short_id"),
        enabled: row.get::<i64, _>("enabled") != 0,
        update: row.get::<i64, _>("update_media") != 0,
        priority: row.get("priority"),
        replication: ReplicationPolicy::parse(row.get("replication"))
            .unwrap_or(ReplicationPolicy::None),
        seed_sections: row.get("seed_sections"),
        quota_bytes: row.get("quota_bytes"),
        retention_days: row.get("retention_days"),
        sync_files: row.get::<i64, _>("sync_files") != 0,
        shared_with_peers: row.get::<i64, _>("shared_with_peers") != 0,
        relative_path: row.get("relative_path"),
    }
}

fn row_to_server(row: &sqlx::sqlite::SqliteRow) -> ServerInfo {
    ServerInfo {
        id: row.get("id"),
        name: row.get("name"),
        base_url: row.get("base_url"),
        enabled: row.get::<i64, _>("enabled") != 0,
        priority: row.get("priority"),
        ip_mode: IpMode::parse(row.get("ip_mode")).unwrap_or(IpMode::Auto),
        last_test_ok: row
            .get::<Option<i64>, _>("last_test_ok")
            .map(|v| v != 0),
        last_test_at: row.get("last_test_at"),
    }
}

impl Catalog {
    /// Create a media. Fails if the name is taken.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MediaExists` on a duplicate name.
    pub async fn add_media(&self, new: &NewMedia) -> Result<i64, Error> {
        let mut tx = self.pool().begin().await?;

        let exists = query("SELECT id FROM media WHERE name = ?1")
            .bind(&new.name)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_some() {
            return Err(StateError::MediaExists {
                name: new.name.clone(),
            }
            .into());
        }

        let result = query(
            "INSERT INTO media (name, short_id, update_media, priority, relative_path, \
             sync_files, added_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&new.name)
        .bind(&new.short_id)
        .bind(i64::from(new.update))
        .bind(new.priority)
        .bind(&new.relative_path)
        .bind(i64::from(new.sync_files))
        .bind(now_epoch())
        .execute(&mut *tx)
        .await?;

        let media_id = result.last_insert_rowid();
        query("INSERT INTO media_state (media_id) VALUES (?1)")
            .bind(media_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(media_id)
    }

    /// All media, priority-descending then name
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_media(&self) -> Result<Vec<MediaInfo>, Error> {
        let rows = query("SELECT * FROM media ORDER BY priority DESC, name")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(row_to_media).collect())
    }

    /// Look up one media by name
    ///
    /// # Errors
    ///
    /// Returns `StateError::MediaNotFound` for an unknown name.
    pub async fn media_by_name(&self, name: &str) -> Result<MediaInfo, Error> {
        let row = query("SELECT * FROM media WHERE name = ?1")
            .bind(name)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StateError::MediaNotFound {
                name: name.to_string(),
            })?;
        Ok(row_to_media(&row))
    }

    /// Enable or disable a media
    ///
    /// # Errors
    ///
    /// Returns `StateError::MediaNotFound` for an unknown name.
    pub async fn set_media_enabled(&self, name: &str, enabled: bool) -> Result<(), Error> {
        let result = query("UPDATE media SET enabled = ?1 WHERE name = ?2")
            .bind(i64::from(enabled))
            .bind(name)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::MediaNotFound {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Update a media attribute (priority, quota, replication, ...)
    ///
    /// # Errors
    ///
    /// Returns an error for unknown media.
    pub async fn set_media_priority(&self, name: &str, priority: i64) -> Result<(), Error> {
        let result = query("UPDATE media SET priority = ?1 WHERE name = ?2")
            .bind(priority)
            .bind(name)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::MediaNotFound {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Set quota and replication policy
    ///
    /// # Errors
    ///
    /// Returns an error for unknown media.
    pub async fn set_media_replication(
        &self,
        name: &str,
        policy: ReplicationPolicy,
        quota_bytes: i64,
    ) -> Result<(), Error> {
        let result =
            query("UPDATE media SET replication = ?1, quota_bytes = ?2 WHERE name = ?3")
                .bind(policy.as_str())
                .bind(quota_bytes)
                .bind(name)
                .execute(self.pool())
                .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::MediaNotFound {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Destroy a media; packages, deps, files and state cascade.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MediaNotFound` for an unknown name.
    pub async fn remove_media(&self, name: &str) -> Result<(), Error> {
        let result = query("DELETE FROM media WHERE name = ?1")
            .bind(name)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::MediaNotFound {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Per-media sync state used by the differential import
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn media_sync_state(&self, media_id: i64) -> Result<MediaSyncState, Error> {
        let row = query("SELECT * FROM media_state WHERE media_id = ?1")
            .bind(media_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map_or_else(
            || MediaSyncState {
                media_id,
                ..MediaSyncState::default()
            },
            |row| MediaSyncState {
                media_id,
                synthesis_md5: row.get("synthesis_md5"),
                files_md5: row.get("files_md5"),
                file_count: row.get("file_count"),
                package_count: row.get("package_count"),
                compressed_size: row.get("compressed_size"),
                last_sync: row.get("last_sync"),
            },
        ))
    }

    // -- servers ---------------------------------------------------------

    /// Add a server endpoint
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate name.
    pub async fn add_server(&self, name: &str, base_url: &str, priority: i64) -> Result<i64, Error> {
        let result = query(
            "INSERT INTO servers (name, base_url, priority) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(base_url)
        .bind(priority)
        .execute(self.pool())
        .await
        .map_err(|e| StateError::DatabaseError {
            message: e.to_string(),
        })?;
        Ok(result.last_insert_rowid())
    }

    /// All servers, priority-descending
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_servers(&self) -> Result<Vec<ServerInfo>, Error> {
        let rows = query("SELECT * FROM servers ORDER BY priority DESC, name")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(row_to_server).collect())
    }

    /// Enabled servers able to serve a media, priority-descending
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn servers_for_media(&self, media_id: i64) -> Result<Vec<ServerInfo>, Error> {
        let rows = query(
            "SELECT s.* FROM servers s \
             JOIN media_servers ms ON ms.server_id = s.id \
             WHERE ms.media_id = ?1 AND s.enabled = 1 \
             ORDER BY s.priority DESC, s.name",
        )
        .bind(media_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(row_to_server).collect())
    }

    /// Attach a server to a media
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names.
    pub async fn link_server(&self, media_name: &str, server_name: &str) -> Result<(), Error> {
        let media = self.media_by_name(media_name).await?;
        let server = query("SELECT id FROM servers WHERE name = ?1")
            .bind(server_name)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| StateError::ServerNotFound {
                name: server_name.to_string(),
            })?;
        query("INSERT OR IGNORE INTO media_servers (media_id, server_id) VALUES (?1, ?2)")
            .bind(media.id)
            .bind(server.get::<i64, _>("id"))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Enable/disable a server
    ///
    /// # Errors
    ///
    /// Returns `StateError::ServerNotFound` for an unknown name.
    pub async fn set_server_enabled(&self, name: &str, enabled: bool) -> Result<(), Error> {
        let result = query("UPDATE servers SET enabled = ?1 WHERE name = ?2")
            .bind(i64::from(enabled))
            .bind(name)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::ServerNotFound {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Record the outcome of a reachability test
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn record_server_test(&self, name: &str, ok: bool) -> Result<(), Error> {
        query("UPDATE servers SET last_test_ok = ?1, last_test_at = ?2 WHERE name = ?3")
            .bind(i64::from(ok))
            .bind(now_epoch())
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Reorder a server in the failover list
    ///
    /// # Errors
    ///
    /// Returns `StateError::ServerNotFound` for an unknown name.
    pub async fn set_server_priority(&self, name: &str, priority: i64) -> Result<(), Error> {
        let result = query("UPDATE servers SET priority = ?1 WHERE name = ?2")
            .bind(priority)
            .bind(name)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::ServerNotFound {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Set a server's address-family preference
    ///
    /// # Errors
    ///
    /// Returns `StateError::ServerNotFound` for an unknown name.
    pub async fn set_server_ip_mode(&self, name: &str, mode: IpMode) -> Result<(), Error> {
        let result = query("UPDATE servers SET ip_mode = ?1 WHERE name = ?2")
            .bind(mode.as_str())
            .bind(name)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StateError::ServerNotFound {
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
