//! Undo and rollback
//!
//! `undo(id)` runs the inverse of one history entry: packages it added
//! become erases, packages it removed become installs sourced from the
//! catalog at the recorded NEVRA. `rollback(n)` undoes the last n
//! complete entries newest-first; `rollback_to(ts)` replays back to a
//! point in time, rerunning the resolver per step so dependency drift
//! is caught. A NEVRA no longer available from any media aborts with
//! the partial rollback left applied.

use tracing::info;
use urpm_errors::{Error, StateError, TransactionError};
use urpm_resolver::{Transaction, TransactionItem};
use urpm_store::Catalog;
use urpm_types::{
    HistoryAction, HistoryEntry, HistoryStatus, Nevra, PackageDirection,
};

use crate::executor::{ExecutionRequest, Executor};

/// Undo/rollback driver on top of the executor
pub struct UndoDriver<'a> {
    pub catalog: &'a Catalog,
    pub executor: &'a Executor,
    pub user: String,
}

impl UndoDriver<'_> {
    /// Undo one history entry by id.
    ///
    /// # Errors
    ///
    /// `NotUndoable` for entries not in `complete` state;
    /// `NevraUnavailable` when a removed package cannot be re-sourced.
    pub async fn undo(&self, id: i64) -> Result<i64, Error> {
        let entry = self.catalog.history_entry(id).await?;
        if entry.status != HistoryStatus::Complete {
            return Err(TransactionError::NotUndoable {
                id,
                reason: format!("status is {}", entry.status.as_str()),
            }
            .into());
        }

        let transaction = self.inverse_of(&entry).await?;
        info!(id, "undoing history entry");

        let history_id = self
            .executor
            .execute(
                &transaction,
                &ExecutionRequest {
                    action: HistoryAction::Undo,
                    command_line: format!("urpm undo {id}"),
                    user: self.user.clone(),
                    test_only: false,
                },
            )
            .await?;

        self.catalog.history_mark_rolled_back(id).await?;
        Ok(history_id)
    }

    /// Undo the last `n` complete entries, newest first.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step; earlier undos stay applied.
    pub async fn rollback(&self, n: usize) -> Result<Vec<i64>, Error> {
        let entries = self.catalog.history_list(i64::MAX).await?;
        let targets: Vec<i64> = entries
            .iter()
            .filter(|e| e.status == HistoryStatus::Complete && e.action != HistoryAction::Undo)
            .take(n)
            .map(|e| e.id)
            .collect();

        let mut undone = Vec::new();
        for id in targets {
            undone.push(self.undo(id).await?);
        }
        Ok(undone)
    }

    /// Replay history backwards until the state recorded at `timestamp`.
    ///
    /// # Errors
    ///
    /// Aborts with `NevraUnavailable` (leaving earlier reverted steps
    /// applied) when a required package has left every media.
    pub async fn rollback_to(&self, timestamp: i64) -> Result<Vec<i64>, Error> {
        let mut entries = self.catalog.history_since(timestamp).await?;
        // Newest first
        entries.sort_by_key(|e| std::cmp::Reverse(e.id));

        let mut undone = Vec::new();
        for entry in entries {
            if entry.action == HistoryAction::Undo {
                continue;
            }
            undone.push(self.undo(entry.id).await?);
        }
        Ok(undone)
    }

    /// Build the inverse transaction of an entry from the catalog.
    async fn inverse_of(&self, entry: &HistoryEntry) -> Result<Transaction, Error> {
        let mut transaction = Transaction::default();

        for pkg in &entry.packages {
            match pkg.direction {
                PackageDirection::Added => {
                    // Erase what the entry installed; dependents-first
                    // ordering is preserved by reversing the recorded
                    // install order below
                    transaction.to_erase.push(Nevra::parse(&pkg.nevra));
                }
                PackageDirection::Removed => {
                    // Reinstall at the recorded NEVRA, sourced from the
                    // catalog
                    match self.catalog.package_by_nevra(&pkg.nevra).await {
                        Ok(found) => transaction.to_install.push(TransactionItem {
                            nevra: found.meta.nevra.clone(),
                            media_id: Some(found.media_id),
                            digest: found.meta.digest.clone(),
                            file_size: found.meta.file_size,
                        }),
                        Err(Error::State(StateError::PackageNotFound { .. })) => {
                            return Err(TransactionError::NevraUnavailable {
                                nevra: pkg.nevra.clone(),
                            }
                            .into());
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        // The entry recorded installs dependency-first; erase them in
        // the reverse order
        transaction.to_erase.reverse();
        Ok(transaction)
    }
}
