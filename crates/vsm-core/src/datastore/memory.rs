//! In-memory data store.
//!
//! Entries live in a `BTreeMap` behind a `RwLock`; the sorted keys make the
//! child scan a range walk. Not persistent. Used for tests and development
//! configurations.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::DataStoreError;

use super::{child_prefix, is_immediate_child, DataStoreAdapter, DataStoreEntry};

/// An in-memory data store backed by a `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataStore {
    entries: Arc<RwLock<BTreeMap<String, DataStoreEntry>>>,
}

impl MemoryDataStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DataStoreAdapter for MemoryDataStore {
    async fn create_entry(&self, entry: &DataStoreEntry) -> Result<(), DataStoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.path) {
            return Err(DataStoreError::AlreadyExists {
                path: entry.path.clone(),
            });
        }
        entries.insert(entry.path.clone(), entry.clone());
        Ok(())
    }

    async fn read_entry(&self, path: &str) -> Result<DataStoreEntry, DataStoreError> {
        let entries = self.entries.read().await;
        entries
            .get(path)
            .cloned()
            .ok_or_else(|| DataStoreError::NotFound {
                path: path.to_owned(),
            })
    }

    async fn delete_entry(&self, path: &str) -> Result<(), DataStoreError> {
        let mut entries = self.entries.write().await;
        match entries.remove(path) {
            Some(_) => Ok(()),
            None => Err(DataStoreError::NotFound {
                path: path.to_owned(),
            }),
        }
    }

    async fn search_children(
        &self,
        parent_path: &str,
    ) -> Result<Vec<DataStoreEntry>, DataStoreError> {
        let prefix = child_prefix(parent_path);
        let entries = self.entries.read().await;
        let children = entries
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| is_immediate_child(path, &prefix))
            .map(|(_, entry)| entry.clone())
            .collect();
        Ok(children)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(path: &str) -> DataStoreEntry {
        DataStoreEntry {
            path: path.to_owned(),
            owner_entry_id: "user0".to_owned(),
            entry_type: "Data".to_owned(),
            meta_data: String::new(),
            secret_data: Vec::new(),
            authorization_policy_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_and_read_roundtrip() {
        let store = MemoryDataStore::new();
        store.create_entry(&entry("secrets/a")).await.unwrap();
        let read = store.read_entry("secrets/a").await.unwrap();
        assert_eq!(read.path, "secrets/a");
    }

    #[tokio::test]
    async fn create_twice_fails_already_exists() {
        let store = MemoryDataStore::new();
        store.create_entry(&entry("secrets/a")).await.unwrap();
        let err = store.create_entry(&entry("secrets/a")).await.unwrap_err();
        assert!(matches!(err, DataStoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn read_missing_fails_not_found() {
        let store = MemoryDataStore::new();
        let err = store.read_entry("secrets/nope").await.unwrap_err();
        assert!(matches!(err, DataStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_then_read_fails_not_found() {
        let store = MemoryDataStore::new();
        store.create_entry(&entry("secrets/a")).await.unwrap();
        store.delete_entry("secrets/a").await.unwrap();
        let err = store.read_entry("secrets/a").await.unwrap_err();
        assert!(matches!(err, DataStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_missing_fails_not_found() {
        let store = MemoryDataStore::new();
        let err = store.delete_entry("secrets/nope").await.unwrap_err();
        assert!(matches!(err, DataStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn search_children_returns_immediate_children_only() {
        let store = MemoryDataStore::new();
        store.create_entry(&entry("namespaces/")).await.unwrap();
        store.create_entry(&entry("namespaces/a")).await.unwrap();
        store.create_entry(&entry("namespaces/b")).await.unwrap();
        store.create_entry(&entry("namespaces/a/nested")).await.unwrap();
        store.create_entry(&entry("secrets/x")).await.unwrap();

        let children = store.search_children("namespaces/").await.unwrap();
        let paths: Vec<_> = children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["namespaces/a", "namespaces/b"]);

        let nested = store.search_children("namespaces/a").await.unwrap();
        let paths: Vec<_> = nested.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["namespaces/a/nested"]);
    }

    #[tokio::test]
    async fn search_children_empty_for_leaf() {
        let store = MemoryDataStore::new();
        store.create_entry(&entry("namespaces/a")).await.unwrap();
        let children = store.search_children("namespaces/a").await.unwrap();
        assert!(children.is_empty());
    }
}
