#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions, clippy::missing_panics_doc)]

//! Catalog store for urpm
//!
//! This crate owns the on-disk `SQLite` catalog: media, servers,
//! packages and their capability lists, the file-search index, holds,
//! blacklists, transaction history, peers and settings. It is the sole
//! writer; everything else goes through the typed API here, never
//! through SQL.

mod files;
mod history;
mod import;
mod media;
mod packages;
mod peers;

pub use files::FileHit;
pub use import::{ImportOutcome, SynthesisImport};
pub use media::NewMedia;
pub use packages::CatalogPackage;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use urpm_errors::Error;

/// Create a new `SQLite` connection pool
///
/// # Errors
///
/// Returns an error if the database connection fails or configuration is
/// invalid.
pub async fn create_pool(db_path: &Path) -> Result<Pool<Sqlite>, Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| {
            urpm_errors::StateError::DatabaseError {
                message: e.to_string(),
            }
            .into()
        })
}

/// Run database migrations
///
/// # Errors
///
/// Returns an error if any migration fails to execute.
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        urpm_errors::StateError::MigrationFailed {
            message: e.to_string(),
        }
        .into()
    })
}

/// Handle to the catalog database
#[derive(Clone)]
pub struct Catalog {
    pool: Pool<Sqlite>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

impl Catalog {
    /// Open (creating if necessary) the catalog at `db_path` and bring
    /// the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation or a migration fails.
    pub async fn open(db_path: &Path) -> Result<Self, Error> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let pool = create_pool(db_path).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests)
    #[must_use]
    pub fn with_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

pub(crate) fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
