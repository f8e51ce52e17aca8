//! Exclusive transaction lock
//!
//! Two user transactions are mutually exclusive; an advisory lock file
//! guards the RPM database across processes. The lock releases on drop,
//! including every error and cancellation path.

use std::path::{Path, PathBuf};
use urpm_errors::{Error, TransactionError};

/// Held for the duration of one RPM transaction
#[derive(Debug)]
pub struct RpmLock {
    path: PathBuf,
}

impl RpmLock {
    /// Try to take the lock; fails immediately when another transaction
    /// holds it.
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::Locked` when the lock file already
    /// exists with a live owner, or an I/O error when the file cannot
    /// be created.
    pub async fn acquire(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(mut file) => {
                use tokio::io::AsyncWriteExt;
                let _ = file.write_all(std::process::id().to_string().as_bytes()).await;
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if Self::owner_is_dead(path).await {
                    // Stale lock from a crashed process; reclaim it
                    tokio::fs::remove_file(path)
                        .await
                        .map_err(|e| Error::io_with_path(&e, path))?;
                    Box::pin(Self::acquire(path)).await
                } else {
                    Err(TransactionError::Locked.into())
                }
            }
            Err(e) => Err(Error::io_with_path(&e, path)),
        }
    }

    async fn owner_is_dead(path: &Path) -> bool {
        let Ok(contents) = tokio::fs::read_to_string(path).await else {
            return true;
        };
        let Ok(pid) = contents.trim().parse::<u32>() else {
            return true;
        };
        // A live owner has a /proc entry on Linux
        !std::path::Path::new(&format!("/proc/{pid}")).exists()
    }
}

impl Drop for RpmLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urpm.lock");

        let lock = RpmLock::acquire(&path).await.unwrap();
        let second = RpmLock::acquire(&path).await;
        assert!(matches!(
            second,
            Err(Error::Transaction(TransactionError::Locked))
        ));

        drop(lock);
        // Released on drop; can be taken again
        let _relock = RpmLock::acquire(&path).await.unwrap();
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urpm.lock");
        // A pid that cannot exist
        tokio::fs::write(&path, "4294967294").await.unwrap();

        let lock = RpmLock::acquire(&path).await;
        assert!(lock.is_ok());
    }
}
