//! Hierarchical namespace manager.
//!
//! Namespaces form a tree rooted at `/`, persisted in the data store under
//! the `namespaces` prefix (disjoint from secrets). Invariants:
//!
//! - the root exists before any non-root namespace;
//! - every non-root namespace has an existing parent;
//! - a namespace with children cannot be deleted;
//! - paths are unique.
//!
//! `child_paths` is derived by scanning the store at read time, never
//! persisted; under contention the returned list reflects the store at the
//! moment of the scan. Operations against the same parent serialize on that
//! parent's lock, operations on disjoint subtrees proceed in parallel.

use std::sync::Arc;

use tracing::info;

use crate::datastore::{
    namespace_to_store_path, DataStoreAdapter, DataStoreEntry, NAMESPACE_ENTRY_TYPE,
};
use crate::error::{DataStoreError, NamespaceError};
use crate::locks::PathLocks;
use crate::model::NamespaceEntry;

/// Path registry over the data store.
pub struct NamespaceManager {
    data_store: Arc<dyn DataStoreAdapter>,
    locks: PathLocks,
}

impl NamespaceManager {
    #[must_use]
    pub fn new(data_store: Arc<dyn DataStoreAdapter>) -> Self {
        Self {
            data_store,
            locks: PathLocks::new(),
        }
    }

    /// Create a namespace. The path becomes the namespace's stable id.
    ///
    /// # Errors
    ///
    /// - [`NamespaceError::InvalidPath`] if the path is malformed.
    /// - [`NamespaceError::ParentNotFound`] if the parent does not exist.
    /// - [`NamespaceError::AlreadyExists`] if the path is occupied.
    pub async fn create_namespace(
        &self,
        entry: &NamespaceEntry,
    ) -> Result<String, NamespaceError> {
        validate_namespace_path(&entry.path)?;

        let lock_path = parent_namespace(&entry.path).unwrap_or("/");
        let _guard = self.locks.acquire(lock_path).await;

        if let Some(parent) = parent_namespace(&entry.path) {
            match self
                .data_store
                .read_entry(&namespace_to_store_path(parent))
                .await
            {
                Ok(_) => {}
                Err(DataStoreError::NotFound { .. }) => {
                    return Err(NamespaceError::ParentNotFound {
                        parent: parent.to_owned(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        let stored = DataStoreEntry::from_namespace_entry(entry);
        match self.data_store.create_entry(&stored).await {
            Ok(()) => {}
            Err(DataStoreError::AlreadyExists { .. }) => {
                return Err(NamespaceError::AlreadyExists {
                    path: entry.path.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(path = %entry.path, owner = %entry.owner_entry_id, "namespace created");
        Ok(entry.path.clone())
    }

    /// Fetch a namespace with its immediate children populated.
    ///
    /// # Errors
    ///
    /// Returns [`NamespaceError::NotFound`] if no namespace exists at the
    /// path.
    pub async fn get_namespace(&self, path: &str) -> Result<NamespaceEntry, NamespaceError> {
        let store_path = namespace_to_store_path(path);
        let stored = match self.data_store.read_entry(&store_path).await {
            Ok(entry) => entry,
            Err(DataStoreError::NotFound { .. }) => {
                return Err(NamespaceError::NotFound {
                    path: path.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut entry = stored.to_namespace_entry();
        entry.child_paths = self.child_paths(&store_path).await?;
        Ok(entry)
    }

    /// Delete a namespace by id (its path).
    ///
    /// # Errors
    ///
    /// - [`NamespaceError::HasChildren`] if any child namespace exists.
    /// - [`NamespaceError::NotFound`] if no namespace exists at the path.
    pub async fn delete_namespace(&self, id: &str) -> Result<(), NamespaceError> {
        // The node is the parent of any children racing to appear under it;
        // holding its lock serializes against those creates.
        let _guard = self.locks.acquire(id).await;

        let store_path = namespace_to_store_path(id);
        let children = self.child_paths(&store_path).await?;
        if !children.is_empty() {
            return Err(NamespaceError::HasChildren {
                path: id.to_owned(),
            });
        }

        match self.data_store.delete_entry(&store_path).await {
            Ok(()) => {
                info!(path = %id, "namespace deleted");
                Ok(())
            }
            Err(DataStoreError::NotFound { .. }) => Err(NamespaceError::NotFound {
                path: id.to_owned(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn child_paths(&self, store_path: &str) -> Result<Vec<String>, NamespaceError> {
        let children = self.data_store.search_children(store_path).await?;
        Ok(children
            .iter()
            .filter(|child| child.entry_type == NAMESPACE_ENTRY_TYPE)
            .map(|child| child.to_namespace_entry().path)
            .collect())
    }
}

impl std::fmt::Debug for NamespaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceManager").finish_non_exhaustive()
    }
}

/// The parent of a namespace path, or `None` for the root.
fn parent_namespace(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Namespace paths are absolute, `/`-rooted, with non-empty segments of
/// safe characters and no trailing slash (except the root itself).
fn validate_namespace_path(path: &str) -> Result<(), NamespaceError> {
    let invalid = |reason: &str| NamespaceError::InvalidPath {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };

    if !path.starts_with('/') {
        return Err(invalid("path must be absolute"));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(invalid("path must not end with '/'"));
    }
    for segment in path[1..].split('/') {
        if segment.is_empty() {
            return Err(invalid("path segments must not be empty"));
        }
        if !segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
        {
            return Err(invalid(
                "path segments may only contain alphanumeric characters, '_', '-', and '.'",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::datastore::MemoryDataStore;

    use super::*;

    fn manager() -> NamespaceManager {
        NamespaceManager::new(Arc::new(MemoryDataStore::new()))
    }

    fn entry(path: &str, owner: &str) -> NamespaceEntry {
        NamespaceEntry {
            path: path.to_owned(),
            owner_entry_id: owner.to_owned(),
            authorization_policy_ids: Vec::new(),
            child_paths: Vec::new(),
        }
    }

    // ── path validation ──────────────────────────────────────────────

    #[test]
    fn validate_accepts_root_and_nested() {
        assert!(validate_namespace_path("/").is_ok());
        assert!(validate_namespace_path("/team").is_ok());
        assert!(validate_namespace_path("/team/app-1").is_ok());
    }

    #[test]
    fn validate_rejects_relative_and_malformed() {
        assert!(validate_namespace_path("team").is_err());
        assert!(validate_namespace_path("/team/").is_err());
        assert!(validate_namespace_path("//team").is_err());
        assert!(validate_namespace_path("/te am").is_err());
    }

    #[test]
    fn parent_namespace_walks_up() {
        assert_eq!(parent_namespace("/"), None);
        assert_eq!(parent_namespace("/a"), Some("/"));
        assert_eq!(parent_namespace("/a/b"), Some("/a"));
    }

    // ── create / get / delete ────────────────────────────────────────

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let nm = manager();
        let ns = entry("/", "user0");

        let id = nm.create_namespace(&ns).await.unwrap();
        assert!(!id.is_empty());

        let fetched = nm.get_namespace(&id).await.unwrap();
        assert_eq!(fetched.path, ns.path);
        assert_eq!(fetched.owner_entry_id, ns.owner_entry_id);
        assert!(fetched.child_paths.is_empty());

        nm.delete_namespace(&id).await.unwrap();
    }

    #[tokio::test]
    async fn create_same_path_twice_fails() {
        let nm = manager();
        nm.create_namespace(&entry("/", "user0")).await.unwrap();
        let err = nm.create_namespace(&entry("/", "user0")).await.unwrap_err();
        assert!(matches!(err, NamespaceError::AlreadyExists { .. }));

        nm.create_namespace(&entry("/child", "user0")).await.unwrap();
        let err = nm
            .create_namespace(&entry("/child", "user0"))
            .await
            .unwrap_err();
        assert!(matches!(err, NamespaceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn create_without_parent_fails() {
        let nm = manager();
        let err = nm
            .create_namespace(&entry("/child", "user0"))
            .await
            .unwrap_err();
        assert!(matches!(err, NamespaceError::ParentNotFound { .. }));
    }

    #[tokio::test]
    async fn get_nonexistent_fails() {
        let nm = manager();
        let err = nm.get_namespace("/not/exists").await.unwrap_err();
        assert!(matches!(err, NamespaceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_nonexistent_fails() {
        let nm = manager();
        let err = nm.delete_namespace("/nope").await.unwrap_err();
        assert!(matches!(err, NamespaceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_with_children_fails_until_leaves_removed() {
        let nm = manager();
        nm.create_namespace(&entry("/", "user0")).await.unwrap();
        nm.create_namespace(&entry("/child", "user0")).await.unwrap();
        nm.create_namespace(&entry("/child/grandchild", "user0"))
            .await
            .unwrap();

        let err = nm.delete_namespace("/").await.unwrap_err();
        assert!(matches!(err, NamespaceError::HasChildren { .. }));
        let err = nm.delete_namespace("/child").await.unwrap_err();
        assert!(matches!(err, NamespaceError::HasChildren { .. }));

        nm.delete_namespace("/child/grandchild").await.unwrap();
        nm.delete_namespace("/child").await.unwrap();
        nm.delete_namespace("/").await.unwrap();
    }

    #[tokio::test]
    async fn children_are_derived_on_read() {
        let nm = manager();
        nm.create_namespace(&entry("/", "user0")).await.unwrap();

        let child_count = 3;
        for i in 0..child_count {
            nm.create_namespace(&entry(&format!("/{i}"), &format!("user-{i}")))
                .await
                .unwrap();
        }

        let root = nm.get_namespace("/").await.unwrap();
        assert_eq!(root.child_paths.len(), child_count);

        for i in 0..child_count {
            let path = format!("/{i}");
            let child = nm.get_namespace(&path).await.unwrap();
            assert_eq!(child.owner_entry_id, format!("user-{i}"));
            nm.delete_namespace(&path).await.unwrap();
        }

        let root = nm.get_namespace("/").await.unwrap();
        assert!(root.child_paths.is_empty());
    }

    #[tokio::test]
    async fn grandchildren_do_not_appear_as_root_children() {
        let nm = manager();
        nm.create_namespace(&entry("/", "user0")).await.unwrap();
        nm.create_namespace(&entry("/a", "user0")).await.unwrap();
        nm.create_namespace(&entry("/a/b", "user0")).await.unwrap();

        let root = nm.get_namespace("/").await.unwrap();
        assert_eq!(root.child_paths, vec!["/a".to_owned()]);
        let a = nm.get_namespace("/a").await.unwrap();
        assert_eq!(a.child_paths, vec!["/a/b".to_owned()]);
    }

    #[tokio::test]
    async fn invalid_path_rejected_on_create() {
        let nm = manager();
        let err = nm
            .create_namespace(&entry("relative", "user0"))
            .await
            .unwrap_err();
        assert!(matches!(err, NamespaceError::InvalidPath { .. }));
    }
}
