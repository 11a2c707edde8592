//! Key-store backend abstraction for VSM.
//!
//! This crate defines the [`KeyStoreBackend`] trait — a minimal store of
//! opaque byte blobs addressed by a path. The virtual key store in
//! `vsm-core` fans every data-encryption key out across several backends
//! as threshold shares; a single backend never holds enough material to
//! reconstruct a key on its own (unless the deployment runs with a single
//! store, which is an explicit degenerate configuration).
//!
//! Three implementations are provided:
//!
//! - [`MemoryKeyStore`] — in-memory, for testing and single-process setups
//! - [`FileKeyStore`] — one file per share under a root directory
//! - [`PostgresKeyStore`] — external service, addressed by a connection
//!   string (feature `postgres-backend`)
//!
//! Backends are addressed by their position in the server configuration's
//! `keyStores` list. That position is the backend's stable index: the share
//! written to index `k` must be readable from index `k` after a restart, so
//! operators must not reorder the list once shares exist.

mod error;
mod file;
mod memory;
#[cfg(feature = "postgres-backend")]
mod postgres;

pub use error::KeyStoreError;
pub use file::FileKeyStore;
pub use memory::MemoryKeyStore;
#[cfg(feature = "postgres-backend")]
pub use postgres::PostgresKeyStore;

/// A store of opaque byte blobs addressed by a `/`-separated path.
///
/// Paths are relative UTF-8 strings (e.g. `secrets/42`). Values are opaque —
/// the caller decides what they mean; this layer never interprets them.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait KeyStoreBackend: Send + Sync + 'static {
    /// Store a blob at `path`.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::AlreadyExists`] if the path is already occupied.
    /// - [`KeyStoreError::Backend`] if the underlying store fails.
    async fn create(&self, path: &str, bytes: &[u8]) -> Result<(), KeyStoreError>;

    /// Retrieve the blob at `path`.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::NotFound`] if no blob exists at the path.
    /// - [`KeyStoreError::Backend`] if the underlying store fails.
    async fn read(&self, path: &str) -> Result<Vec<u8>, KeyStoreError>;

    /// Remove the blob at `path`.
    ///
    /// # Errors
    ///
    /// - [`KeyStoreError::NotFound`] if no blob exists at the path.
    /// - [`KeyStoreError::Backend`] if the underlying store fails.
    async fn delete(&self, path: &str) -> Result<(), KeyStoreError>;

    /// Release any resources held by the backend.
    ///
    /// The default implementation is a no-op; backends with open handles
    /// override it.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Backend`] if teardown fails.
    async fn close(&self) -> Result<(), KeyStoreError> {
        Ok(())
    }
}

/// Reject paths that could escape the backend's namespace.
///
/// Shared by backends that map paths onto an external hierarchy (the file
/// backend maps them onto directories). Rules: non-empty, relative, no `..`
/// segments, no NUL bytes.
pub(crate) fn validate_path(path: &str) -> Result<(), KeyStoreError> {
    let invalid = |reason: &str| KeyStoreError::InvalidPath {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };

    if path.is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if path.starts_with('/') {
        return Err(invalid("path must be relative"));
    }
    if path.contains('\0') {
        return Err(invalid("path must not contain NUL bytes"));
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(invalid("path must not contain '..' segments"));
    }
    Ok(())
}
