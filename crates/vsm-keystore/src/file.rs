//! On-disk key-store backend.
//!
//! Stores one file per share path under a configured root directory. The
//! share path maps directly onto the directory hierarchy (`secrets/42`
//! becomes `<root>/secrets/42`), so an operator can inspect which paths a
//! backend holds without being able to reconstruct any key from it alone.
//!
//! Create uses `create_new` open semantics so a concurrent create of the
//! same path loses with [`KeyStoreError::AlreadyExists`] instead of
//! silently overwriting another share.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::{validate_path, KeyStoreBackend, KeyStoreError};

/// A key-store backend that persists each share as a file.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    root: PathBuf,
}

impl FileKeyStore {
    /// Create a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Backend`] if the root directory cannot be
    /// created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| KeyStoreError::Backend {
                path: root.display().to_string(),
                reason: format!("failed to create root directory: {e}"),
            })?;
        Ok(Self { root })
    }

    /// Return the root directory this backend writes under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, path: &str) -> Result<PathBuf, KeyStoreError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }

    fn backend_err(path: &str, err: &std::io::Error) -> KeyStoreError {
        KeyStoreError::Backend {
            path: path.to_owned(),
            reason: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl KeyStoreBackend for FileKeyStore {
    async fn create(&self, path: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        let file_path = self.file_path(path)?;

        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::backend_err(path, &e))?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(KeyStoreError::AlreadyExists {
                    path: path.to_owned(),
                });
            }
            Err(e) => return Err(Self::backend_err(path, &e)),
        };

        file.write_all(bytes)
            .await
            .map_err(|e| Self::backend_err(path, &e))?;
        file.flush().await.map_err(|e| Self::backend_err(path, &e))?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, KeyStoreError> {
        let file_path = self.file_path(path)?;
        match tokio::fs::read(&file_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(KeyStoreError::NotFound {
                path: path.to_owned(),
            }),
            Err(e) => Err(Self::backend_err(path, &e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), KeyStoreError> {
        let file_path = self.file_path(path)?;
        match tokio::fs::remove_file(&file_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(KeyStoreError::NotFound {
                path: path.to_owned(),
            }),
            Err(e) => Err(Self::backend_err(path, &e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn make_store() -> (tempfile::TempDir, FileKeyStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn create_and_read_roundtrip() {
        let (_dir, store) = make_store().await;
        store.create("secrets/a", b"share").await.unwrap();
        assert_eq!(store.read("secrets/a").await.unwrap(), b"share");
    }

    #[tokio::test]
    async fn create_twice_fails_already_exists() {
        let (_dir, store) = make_store().await;
        store.create("secrets/a", b"v1").await.unwrap();
        let err = store.create("secrets/a", b"v2").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::AlreadyExists { .. }));
        // Original bytes untouched.
        assert_eq!(store.read("secrets/a").await.unwrap(), b"v1");
    }

    #[tokio::test]
    async fn read_missing_fails_not_found() {
        let (_dir, store) = make_store().await;
        let err = store.read("secrets/nope").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_then_read_fails_not_found() {
        let (_dir, store) = make_store().await;
        store.create("secrets/a", b"v").await.unwrap();
        store.delete("secrets/a").await.unwrap();
        let err = store.read("secrets/a").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_missing_fails_not_found() {
        let (_dir, store) = make_store().await;
        let err = store.delete("secrets/nope").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn traversal_path_rejected() {
        let (_dir, store) = make_store().await;
        let err = store.create("../escape", b"v").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileKeyStore::open(dir.path()).await.unwrap();
            store.create("secrets/a", b"persisted").await.unwrap();
        }
        let store = FileKeyStore::open(dir.path()).await.unwrap();
        assert_eq!(store.read("secrets/a").await.unwrap(), b"persisted");
    }
}
