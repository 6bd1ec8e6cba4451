//! Store directory layout and locking.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Name of the lock file inside a store directory.
const LOCK_FILE: &str = "LOCK";

/// Name of the queue journal file.
const QUEUE_LOG: &str = "queue.log";

/// Name of the cache journal file.
const CACHE_LOG: &str = "cache.log";

/// A store directory with an exclusive advisory lock.
///
/// The layout is:
///
/// ```text
/// <root>/
/// ├── LOCK        # advisory lock, held while the store is open
/// ├── queue.log   # pending-action journal
/// └── cache.log   # mirror cache journal
/// ```
///
/// The lock is held for the lifetime of this handle and released when it
/// drops, so two processes can never mutate the same store concurrently.
#[derive(Debug)]
pub struct StoreDir {
    root: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Opens a store directory, optionally creating it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DirNotFound`] if the directory is missing and
    /// `create_if_missing` is false, and [`StoreError::Locked`] if another
    /// process holds the lock.
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(StoreError::DirNotFound {
                    path: path.to_path_buf(),
                });
            }
            std::fs::create_dir_all(path)?;
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked {
                path: path.to_path_buf(),
            })?;

        Ok(Self {
            root: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of the queue journal.
    #[must_use]
    pub fn queue_log(&self) -> PathBuf {
        self.root.join(QUEUE_LOG)
    }

    /// Returns the path of the cache journal.
    #[must_use]
    pub fn cache_log(&self) -> PathBuf {
        self.root.join(CACHE_LOG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let store_dir = StoreDir::open(&root, true).unwrap();
        assert!(root.exists());
        assert!(root.join("LOCK").exists());
        assert_eq!(store_dir.root(), root);
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("absent");

        let result = StoreDir::open(&root, false);
        assert!(matches!(result, Err(StoreError::DirNotFound { .. })));
    }

    #[test]
    fn second_open_is_rejected() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let _held = StoreDir::open(&root, true).unwrap();
        let second = StoreDir::open(&root, true);
        assert!(matches!(second, Err(StoreError::Locked { .. })));
    }

    #[test]
    fn lock_releases_on_drop() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        {
            let _held = StoreDir::open(&root, true).unwrap();
        }
        assert!(StoreDir::open(&root, true).is_ok());
    }

    #[test]
    fn journal_paths() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        let store_dir = StoreDir::open(&root, true).unwrap();
        assert_eq!(store_dir.queue_log(), root.join("queue.log"));
        assert_eq!(store_dir.cache_log(), root.join("cache.log"));
    }
}
