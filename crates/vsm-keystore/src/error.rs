//! Key-store error types.
//!
//! Every error variant carries enough context to diagnose the problem
//! without a debugger. Share bytes never appear in error messages.

/// Errors that can occur during key-store operations.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// A share already exists at the given path.
    #[error("key path already exists: '{path}'")]
    AlreadyExists { path: String },

    /// No share exists at the given path.
    #[error("key path not found: '{path}'")]
    NotFound { path: String },

    /// The key path is malformed (empty, absolute, traversal, or NUL).
    #[error("invalid key path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The underlying backend failed.
    #[error("key store backend failure on '{path}': {reason}")]
    Backend { path: String, reason: String },
}
