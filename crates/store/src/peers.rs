//! Peer table and settings
//!
//! Peer rows are ephemeral: refreshed by discovery, swept when stale.
//! Only the blacklist flag survives a sweep (kept per machine id in
//! settings so operator intent outlives the row).

use sqlx::{query, Row};
use urpm_errors::Error;
use urpm_types::PeerInfo;

use crate::{now_epoch, Catalog};

fn row_to_peer(row: &sqlx::sqlite::SqliteRow) -> PeerInfo {
    let served: String = row.get("served_media");
    PeerInfo {
        host: row.get("host"),
        port: u16::try_from(row.get::<i64, _>("port")).unwrap_or(0),
        machine_id: row.get("machine_id"),
        release: row.get("release"),
        arch: row.get("arch"),
        last_seen: row.get("last_seen"),
        blacklisted: row.get::<i64, _>("blacklisted") != 0,
        development_mode: row.get::<i64, _>("development_mode") != 0,
        served_media: serde_json::from_str(&served).unwrap_or_default(),
    }
}

impl Catalog {
    /// Insert or refresh a peer row keyed by machine id
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn upsert_peer(&self, peer: &PeerInfo) -> Result<(), Error> {
        let served = serde_json::to_string(&peer.served_media)?;
        query(
            "INSERT INTO peers \
             (machine_id, host, port, release, arch, last_seen, blacklisted, \
              development_mode, served_media) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, \
                     COALESCE((SELECT blacklisted FROM peers WHERE machine_id = ?1), 0), \
                     ?7, ?8) \
             ON CONFLICT(machine_id) DO UPDATE SET \
               host = excluded.host, port = excluded.port, release = excluded.release, \
               arch = excluded.arch, last_seen = excluded.last_seen, \
               development_mode = excluded.development_mode, \
               served_media = excluded.served_media",
        )
        .bind(&peer.machine_id)
        .bind(&peer.host)
        .bind(i64::from(peer.port))
        .bind(&peer.release)
        .bind(&peer.arch)
        .bind(peer.last_seen)
        .bind(i64::from(peer.development_mode))
        .bind(served)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// All known peers, most recently seen first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_peers(&self) -> Result<Vec<PeerInfo>, Error> {
        let rows = query("SELECT * FROM peers ORDER BY last_seen DESC")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(row_to_peer).collect())
    }

    /// Healthy peers: alive within the stale window and not blacklisted
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn healthy_peers(&self, stale_after_secs: i64) -> Result<Vec<PeerInfo>, Error> {
        let cutoff = now_epoch() - stale_after_secs;
        let rows = query(
            "SELECT * FROM peers WHERE last_seen >= ?1 AND blacklisted = 0 \
             ORDER BY last_seen DESC",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(row_to_peer).collect())
    }

    /// Drop rows older than the stale window; returns how many
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn expire_peers(&self, stale_after_secs: i64) -> Result<u64, Error> {
        let cutoff = now_epoch() - stale_after_secs;
        let result = query("DELETE FROM peers WHERE last_seen < ?1")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Operator blacklist for a peer
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_peer_blacklisted(
        &self,
        machine_id: &str,
        blacklisted: bool,
    ) -> Result<(), Error> {
        query("UPDATE peers SET blacklisted = ?1 WHERE machine_id = ?2")
            .bind(i64::from(blacklisted))
            .bind(machine_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Remove every peer row (daemon start, `peer clean`)
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn clear_peers(&self) -> Result<(), Error> {
        query("DELETE FROM peers").execute(self.pool()).await?;
        Ok(())
    }

    // -- settings --------------------------------------------------------

    /// Read one setting
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn setting(&self, key: &str) -> Result<Option<String>, Error> {
        let row = query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    /// Write one setting
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        query("INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
