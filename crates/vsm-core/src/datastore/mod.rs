//! Data store adapter: uniform metadata-entry CRUD.
//!
//! The data store persists [`DataStoreEntry`] records keyed by path. It
//! never interprets `secret_data` (always ciphertext by the time it arrives
//! here) or `meta_data`; the secret pipeline owns both.
//!
//! Two implementations are bundled: [`MemoryDataStore`] and, behind the
//! `postgres-datastore` feature, [`PostgresDataStore`] addressed by a
//! connection string.
//!
//! Path layout: secrets live under `secrets/<id>`, namespaces under
//! `namespaces<absolute-path>` (a prefix disjoint from secrets).

mod memory;
#[cfg(feature = "postgres-datastore")]
mod postgres;

pub use memory::MemoryDataStore;
#[cfg(feature = "postgres-datastore")]
pub use postgres::PostgresDataStore;

use serde::{Deserialize, Serialize};

use crate::error::DataStoreError;
use crate::model::{NamespaceEntry, SecretEntry};

/// Entry type tag for namespace records.
pub const NAMESPACE_ENTRY_TYPE: &str = "namespace";

/// Storage prefix for secret entries.
pub const SECRETS_PREFIX: &str = "secrets";

/// Storage prefix for namespace entries.
pub const NAMESPACES_PREFIX: &str = "namespaces";

/// One persisted record, keyed by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreEntry {
    /// Storage path; primary key.
    pub path: String,
    /// Entry id of the owner.
    pub owner_entry_id: String,
    /// Secret-type name, or [`NAMESPACE_ENTRY_TYPE`] for namespace records.
    pub entry_type: String,
    /// Opaque metadata document (JSON text).
    pub meta_data: String,
    /// Opaque payload bytes; ciphertext for secrets, empty for namespaces.
    pub secret_data: Vec<u8>,
    /// References to authorization policies.
    pub authorization_policy_ids: Vec<String>,
}

/// Uniform CRUD over persisted entries.
///
/// Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait DataStoreAdapter: Send + Sync {
    /// Persist a new entry.
    ///
    /// # Errors
    ///
    /// - [`DataStoreError::AlreadyExists`] if the path is occupied.
    /// - [`DataStoreError::Backend`] if the store fails.
    async fn create_entry(&self, entry: &DataStoreEntry) -> Result<(), DataStoreError>;

    /// Read the entry at `path`.
    ///
    /// # Errors
    ///
    /// - [`DataStoreError::NotFound`] if no entry exists at the path.
    /// - [`DataStoreError::Backend`] if the store fails.
    async fn read_entry(&self, path: &str) -> Result<DataStoreEntry, DataStoreError>;

    /// Delete the entry at `path`.
    ///
    /// # Errors
    ///
    /// - [`DataStoreError::NotFound`] if no entry exists at the path.
    /// - [`DataStoreError::Backend`] if the store fails.
    async fn delete_entry(&self, path: &str) -> Result<(), DataStoreError>;

    /// Return the immediate children of `parent_path`.
    ///
    /// A child is an entry whose path extends `parent_path` by exactly one
    /// segment. The result reflects the store at the moment of the scan.
    ///
    /// # Errors
    ///
    /// Returns [`DataStoreError::Backend`] if the store fails.
    async fn search_children(
        &self,
        parent_path: &str,
    ) -> Result<Vec<DataStoreEntry>, DataStoreError>;
}

// ── path layout ──────────────────────────────────────────────────────

/// Storage path for a secret id: `secrets/<id>`.
#[must_use]
pub fn secret_id_to_path(id: &str) -> String {
    format!("{SECRETS_PREFIX}/{id}")
}

/// Storage path for a namespace path.
///
/// `/` maps to `namespaces/`, `/team/app` to `namespaces/team/app`.
#[must_use]
pub fn namespace_to_store_path(namespace_path: &str) -> String {
    format!("{NAMESPACES_PREFIX}{namespace_path}")
}

/// Inverse of [`namespace_to_store_path`].
#[must_use]
pub fn store_path_to_namespace(store_path: &str) -> String {
    let stripped = store_path
        .strip_prefix(NAMESPACES_PREFIX)
        .unwrap_or(store_path);
    if stripped.is_empty() {
        "/".to_owned()
    } else {
        stripped.to_owned()
    }
}

/// Everything before the final `/` of a storage path.
#[must_use]
pub fn parent_of(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "",
        Some(idx) => &path[..idx],
    }
}

/// Normalize a parent path into the prefix its children share.
fn child_prefix(parent_path: &str) -> String {
    if parent_path.ends_with('/') {
        parent_path.to_owned()
    } else {
        format!("{parent_path}/")
    }
}

/// Whether `path` is an immediate child of the normalized `prefix`.
fn is_immediate_child(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => !rest.is_empty() && !rest.contains('/'),
        None => false,
    }
}

// ── model conversions ────────────────────────────────────────────────

impl DataStoreEntry {
    /// Build the persisted form of a secret entry. The caller supplies the
    /// ciphertext; the entry's own `secret_data` is ignored.
    #[must_use]
    pub fn from_secret_entry(entry: &SecretEntry, ciphertext: Vec<u8>) -> Self {
        Self {
            path: secret_id_to_path(&entry.id),
            owner_entry_id: entry.owner_entry_id.clone(),
            entry_type: entry.secret_type.clone(),
            meta_data: entry.meta_data.clone(),
            secret_data: ciphertext,
            authorization_policy_ids: entry.authorization_policy_ids.clone(),
        }
    }

    /// Reconstruct a secret entry from its persisted form.
    #[must_use]
    pub fn to_secret_entry(&self) -> SecretEntry {
        let id = self
            .path
            .strip_prefix(&format!("{SECRETS_PREFIX}/"))
            .unwrap_or(&self.path)
            .to_owned();
        SecretEntry {
            id,
            secret_type: self.entry_type.clone(),
            owner_entry_id: self.owner_entry_id.clone(),
            meta_data: self.meta_data.clone(),
            secret_data: self.secret_data.clone(),
            authorization_policy_ids: self.authorization_policy_ids.clone(),
        }
    }

    /// Build the persisted form of a namespace entry. `child_paths` is
    /// derived at read time and never stored.
    #[must_use]
    pub fn from_namespace_entry(entry: &NamespaceEntry) -> Self {
        Self {
            path: namespace_to_store_path(&entry.path),
            owner_entry_id: entry.owner_entry_id.clone(),
            entry_type: NAMESPACE_ENTRY_TYPE.to_owned(),
            meta_data: String::new(),
            secret_data: Vec::new(),
            authorization_policy_ids: entry.authorization_policy_ids.clone(),
        }
    }

    /// Reconstruct a namespace entry (without children) from its persisted
    /// form.
    #[must_use]
    pub fn to_namespace_entry(&self) -> NamespaceEntry {
        NamespaceEntry {
            path: store_path_to_namespace(&self.path),
            owner_entry_id: self.owner_entry_id.clone(),
            authorization_policy_ids: self.authorization_policy_ids.clone(),
            child_paths: Vec::new(),
        }
    }
}
