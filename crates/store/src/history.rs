//! Transaction history, holds and name lists
//!
//! History entries are written in their own transactions, never batched
//! with other writes: an entry must survive even when the work that
//! follows it fails.

use sqlx::{query, Row};
use urpm_errors::{Error, StateError};
use urpm_types::{
    HistoryAction, HistoryEntry, HistoryPackage, HistoryStatus, PackageDirection,
};

use crate::{now_epoch, Catalog};

impl Catalog {
    /// Insert an `in-progress` entry and return its id. Ids are strictly
    /// increasing (AUTOINCREMENT).
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn history_begin(
        &self,
        action: HistoryAction,
        command_line: &str,
        user: &str,
    ) -> Result<i64, Error> {
        let mut tx = self.pool().begin().await?;
        let result = query(
            "INSERT INTO history (timestamp, action, status, command_line, user) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(now_epoch())
        .bind(action.as_str())
        .bind(HistoryStatus::InProgress.as_str())
        .bind(command_line)
        .bind(user)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();
        tx.commit().await?;
        Ok(id)
    }

    /// Transition an entry to a terminal state, recording the affected
    /// NEVRA list. An entry transitions exactly once.
    ///
    /// # Errors
    ///
    /// Returns `StateError::HistoryAlreadyTerminal` when the entry has
    /// already left `in-progress`.
    pub async fn history_finish(
        &self,
        id: i64,
        status: HistoryStatus,
        packages: &[HistoryPackage],
        return_code: Option<i32>,
        error: Option<&str>,
    ) -> Result<(), Error> {
        let mut tx = self.pool().begin().await?;

        let row = query("SELECT status FROM history WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StateError::HistoryNotFound { id })?;
        let current: String = row.get("status");
        if HistoryStatus::parse(&current).is_some_and(HistoryStatus::is_terminal) {
            return Err(StateError::HistoryAlreadyTerminal {
                id,
                status: current,
            }
            .into());
        }

        query("UPDATE history SET status = ?1, return_code = ?2, error = ?3 WHERE id = ?4")
            .bind(status.as_str())
            .bind(return_code)
            .bind(error)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for pkg in packages {
            query(
                "INSERT OR IGNORE INTO history_packages (history_id, nevra, direction) \
                 VALUES (?1, ?2, ?3)",
            )
            .bind(id)
            .bind(&pkg.nevra)
            .bind(pkg.direction.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Mark a completed entry rolled back (after a successful undo)
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn history_mark_rolled_back(&self, id: i64) -> Result<(), Error> {
        query("UPDATE history SET status = ?1 WHERE id = ?2")
            .bind(HistoryStatus::RolledBack.as_str())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Load one entry with its package list
    ///
    /// # Errors
    ///
    /// Returns `StateError::HistoryNotFound` for an unknown id.
    pub async fn history_entry(&self, id: i64) -> Result<HistoryEntry, Error> {
        let row = query("SELECT * FROM history WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(StateError::HistoryNotFound { id })?;
        self.hydrate_history_row(&row).await
    }

    /// Newest-first listing
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn history_list(&self, limit: i64) -> Result<Vec<HistoryEntry>, Error> {
        let rows = query("SELECT * FROM history ORDER BY id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.hydrate_history_row(row).await?);
        }
        Ok(out)
    }

    /// Completed entries newer than a timestamp, oldest first (rollback
    /// replay order is the caller's concern)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn history_since(&self, timestamp: i64) -> Result<Vec<HistoryEntry>, Error> {
        let rows = query(
            "SELECT * FROM history WHERE timestamp > ?1 AND status = ?2 ORDER BY id",
        )
        .bind(timestamp)
        .bind(HistoryStatus::Complete.as_str())
        .fetch_all(self.pool())
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.hydrate_history_row(row).await?);
        }
        Ok(out)
    }

    async fn hydrate_history_row(
        &self,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<HistoryEntry, Error> {
        let id: i64 = row.get("id");
        // rowid order preserves the recorded (dependency-first) order,
        // which undo relies on to erase dependents first
        let pkg_rows = query(
            "SELECT nevra, direction FROM history_packages \
             WHERE history_id = ?1 ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        let packages = pkg_rows
            .iter()
            .filter_map(|r| {
                Some(HistoryPackage {
                    nevra: r.get("nevra"),
                    direction: PackageDirection::parse(r.get("direction"))?,
                })
            })
            .collect();

        Ok(HistoryEntry {
            id,
            timestamp: row.get("timestamp"),
            action: HistoryAction::parse(row.get("action"))
                .unwrap_or(HistoryAction::Install),
            status: HistoryStatus::parse(row.get("status"))
                .unwrap_or(HistoryStatus::Failed),
            packages,
            command_line: row.get("command_line"),
            user: row.get("user"),
            return_code: row.get("return_code"),
            error: row.get("error"),
        })
    }

    // -- holds -----------------------------------------------------------

    /// Hold a package name (excluded from upgrade, protected from
    /// obsoletion, its cached artifact never evicted)
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn hold(&self, name: &str, reason: Option<&str>) -> Result<(), Error> {
        query("INSERT OR REPLACE INTO holds (name, reason) VALUES (?1, ?2)")
            .bind(name)
            .bind(reason)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Release a hold
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn unhold(&self, name: &str) -> Result<bool, Error> {
        let result = query("DELETE FROM holds WHERE name = ?1")
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All holds with reasons
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn holds(&self) -> Result<Vec<(String, Option<String>)>, Error> {
        let rows = query("SELECT name, reason FROM holds ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get("name"), r.get("reason")))
            .collect())
    }

    // -- blacklist / redlist ---------------------------------------------

    /// Add to the never-install list
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn blacklist_add(&self, name: &str) -> Result<(), Error> {
        query("INSERT OR IGNORE INTO blacklist (name) VALUES (?1)")
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Remove from the never-install list
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn blacklist_remove(&self, name: &str) -> Result<bool, Error> {
        let result = query("DELETE FROM blacklist WHERE name = ?1")
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The never-install set
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn blacklist(&self) -> Result<Vec<String>, Error> {
        let rows = query("SELECT name FROM blacklist ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(|r| r.get("name")).collect())
    }

    /// The warn-before-autoremove set
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn redlist(&self) -> Result<Vec<String>, Error> {
        let rows = query("SELECT name FROM redlist ORDER BY name")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(|r| r.get("name")).collect())
    }

    /// Add to the warn-before-autoremove set
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn redlist_add(&self, name: &str) -> Result<(), Error> {
        query("INSERT OR IGNORE INTO redlist (name) VALUES (?1)")
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
