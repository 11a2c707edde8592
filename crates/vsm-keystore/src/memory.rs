//! In-memory key-store backend.
//!
//! Stores all shares in a `BTreeMap` behind a `RwLock`. Not persistent —
//! everything is lost when the process exits. Used for tests and for
//! development configurations where persistence does not matter.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{validate_path, KeyStoreBackend, KeyStoreError};

/// An in-memory key-store backend backed by a `BTreeMap`.
///
/// Thread-safe and async-compatible. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKeyStore {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyStoreBackend for MemoryKeyStore {
    async fn create(&self, path: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        validate_path(path)?;
        let mut data = self.data.write().await;
        if data.contains_key(path) {
            return Err(KeyStoreError::AlreadyExists {
                path: path.to_owned(),
            });
        }
        data.insert(path.to_owned(), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, KeyStoreError> {
        validate_path(path)?;
        let data = self.data.read().await;
        data.get(path).cloned().ok_or_else(|| KeyStoreError::NotFound {
            path: path.to_owned(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), KeyStoreError> {
        validate_path(path)?;
        let mut data = self.data.write().await;
        match data.remove(path) {
            Some(_) => Ok(()),
            None => Err(KeyStoreError::NotFound {
                path: path.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_read_roundtrip() {
        let store = MemoryKeyStore::new();
        store.create("secrets/a", b"share-bytes").await.unwrap();
        let bytes = store.read("secrets/a").await.unwrap();
        assert_eq!(bytes, b"share-bytes");
    }

    #[tokio::test]
    async fn create_twice_fails_already_exists() {
        let store = MemoryKeyStore::new();
        store.create("secrets/a", b"v1").await.unwrap();
        let err = store.create("secrets/a", b"v2").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn read_missing_fails_not_found() {
        let store = MemoryKeyStore::new();
        let err = store.read("secrets/nope").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_removes_share() {
        let store = MemoryKeyStore::new();
        store.create("secrets/a", b"v").await.unwrap();
        store.delete("secrets/a").await.unwrap();
        let err = store.read("secrets/a").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_missing_fails_not_found() {
        let store = MemoryKeyStore::new();
        let err = store.delete("secrets/nope").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn create_after_delete_succeeds() {
        let store = MemoryKeyStore::new();
        store.create("secrets/a", b"v1").await.unwrap();
        store.delete("secrets/a").await.unwrap();
        store.create("secrets/a", b"v2").await.unwrap();
        assert_eq!(store.read("secrets/a").await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store = MemoryKeyStore::new();
        let clone = store.clone();
        store.create("k", b"v").await.unwrap();
        assert_eq!(clone.read("k").await.unwrap(), b"v");
    }
}
