//! Transaction execution
//!
//! Takes a resolver transaction, acquires artifacts, hands off to the
//! RPM executor under the exclusive lock, and records history. The
//! history entry is written in its own store transaction before the
//! handoff and transitions exactly once afterwards.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;
use urpm_errors::{Error, TransactionError};
use urpm_events::{Event, EventSender, EventSenderExt};
use urpm_resolver::Transaction;
use urpm_rpm::{RpmLock, RpmTransaction, TransactionElement};
use urpm_store::Catalog;
use urpm_types::{
    HistoryAction, HistoryPackage, HistoryStatus, PackageDirection,
};

use crate::acquire::Acquirer;

/// Execution driver for one resolved transaction
pub struct Executor {
    pub catalog: Catalog,
    pub rpm: Arc<dyn RpmTransaction>,
    pub acquirer: Acquirer,
    pub lock_path: PathBuf,
    pub tx: EventSender,
    pub cancel: Arc<AtomicBool>,
}

/// What to tell the history table about this run
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub action: HistoryAction,
    pub command_line: String,
    pub user: String,
    /// Dry-run: verify with the RPM executor, touch nothing
    pub test_only: bool,
}

impl Executor {
    /// Execute a resolved transaction end to end.
    ///
    /// # Errors
    ///
    /// Returns the underlying failure; the history entry is marked
    /// `failed` first. Cancellation during the RPM handoff is deferred
    /// to its completion.
    pub async fn execute(
        &self,
        transaction: &Transaction,
        request: &ExecutionRequest,
    ) -> Result<i64, Error> {
        if transaction.is_empty() {
            info!("nothing to do");
            return Ok(0);
        }

        // Exclusive across processes for the whole acquisition + handoff
        let _lock = RpmLock::acquire(&self.lock_path).await?;

        let elements = self.assemble(transaction).await?;

        if request.test_only {
            self.rpm.test(&elements).await?;
            return Ok(0);
        }

        let history_id = self
            .catalog
            .history_begin(request.action, &request.command_line, &request.user)
            .await?;
        self.tx.emit(Event::TransactionStarted {
            history_id,
            action: request.action.as_str().to_string(),
        });

        // The handoff itself is not interruptible; note cancellation and
        // record the entry as failed afterwards
        let result = self.handoff(&elements).await;

        match result {
            Ok(()) => {
                if self.cancel.load(Ordering::Relaxed) {
                    // Cancelled during the handoff window: work is done,
                    // record it truthfully as failed-by-cancellation
                    self.catalog
                        .history_finish(
                            history_id,
                            HistoryStatus::Failed,
                            &self.affected(transaction),
                            None,
                            Some("cancelled during RPM handoff"),
                        )
                        .await?;
                    return Err(TransactionError::Cancelled.into());
                }
                self.catalog
                    .history_finish(
                        history_id,
                        HistoryStatus::Complete,
                        &self.affected(transaction),
                        Some(0),
                        None,
                    )
                    .await?;
                self.tx.emit(Event::TransactionCompleted { history_id });
                Ok(history_id)
            }
            Err(e) => {
                self.catalog
                    .history_finish(
                        history_id,
                        HistoryStatus::Failed,
                        &[],
                        None,
                        Some(&e.to_string()),
                    )
                    .await?;
                self.tx.emit(Event::TransactionFailed {
                    history_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Acquire artifacts and assemble RPM elements in resolver order.
    async fn assemble(&self, transaction: &Transaction) -> Result<Vec<TransactionElement>, Error> {
        let mut wanted = Vec::new();
        for item in transaction.artifacts() {
            let short_id = match item.media_id {
                Some(media_id) => self
                    .catalog
                    .list_media()
                    .await?
                    .into_iter()
                    .find(|m| m.id == media_id)
                    .map(|m| m.short_id)
                    .unwrap_or_default(),
                None => String::new(),
            };
            wanted.push((item.clone(), short_id));
        }

        let acquired = self.acquirer.acquire_all(&wanted).await?;
        let path_of = |nevra: &str| {
            acquired
                .iter()
                .find(|a| a.nevra == nevra)
                .map(|a| a.path.clone())
        };

        let mut elements = Vec::new();
        for item in &transaction.to_install {
            let nevra = item.nevra.to_string();
            let path = path_of(&nevra).ok_or_else(|| {
                Error::from(TransactionError::DownloadFailed {
                    nevra: nevra.clone(),
                    message: "artifact not acquired".into(),
                })
            })?;
            elements.push(TransactionElement::Install(path));
        }
        for item in &transaction.to_upgrade {
            let nevra = item.nevra.to_string();
            let path = path_of(&nevra).ok_or_else(|| {
                Error::from(TransactionError::DownloadFailed {
                    nevra: nevra.clone(),
                    message: "artifact not acquired".into(),
                })
            })?;
            elements.push(TransactionElement::Upgrade(path));
        }
        for nevra in &transaction.to_erase {
            elements.push(TransactionElement::Erase(nevra.to_string()));
        }
        Ok(elements)
    }

    async fn handoff(&self, elements: &[TransactionElement]) -> Result<(), Error> {
        let events = self.tx.clone();
        self.rpm
            .run(elements, &move |progress| {
                events.emit(Event::RpmProgress {
                    nevra: progress.nevra,
                    phase: progress.phase,
                    percent: progress.percent,
                });
            })
            .await?;
        Ok(())
    }

    fn affected(&self, transaction: &Transaction) -> Vec<HistoryPackage> {
        let mut packages = Vec::new();
        for item in transaction.artifacts() {
            packages.push(HistoryPackage {
                nevra: item.nevra.to_string(),
                direction: PackageDirection::Added,
            });
        }
        for nevra in &transaction.to_erase {
            packages.push(HistoryPackage {
                nevra: nevra.to_string(),
                direction: PackageDirection::Removed,
            });
        }
        packages
    }
}
