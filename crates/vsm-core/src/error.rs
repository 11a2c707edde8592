//! Error types for `vsm-core`.
//!
//! Each subsystem has its own error enum; variants carry enough context to
//! diagnose the problem without a debugger. No variant ever includes
//! plaintext secret material or key bytes, only paths, identifiers, and
//! operation descriptions.

use crate::model::Operation;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM decryption failed (wrong key, corrupted ciphertext, or
    /// tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// Ciphertext is too short to contain a valid nonce + tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// Key generation failed (RNG failure or invalid parameters).
    #[error("key generation failed: {reason}")]
    KeyGeneration { reason: String },

    /// A key or certificate could not be parsed.
    #[error("key parse failed: {reason}")]
    KeyParse { reason: String },

    /// Certificate construction or signing failed.
    #[error("certificate generation failed: {reason}")]
    Certificate { reason: String },
}

/// Errors from the virtual key store.
#[derive(Debug, thiserror::Error)]
pub enum VksError {
    /// Invalid share count / threshold combination.
    #[error("invalid virtual key store config: {reason}")]
    InvalidConfig { reason: String },

    /// Writing shares failed and already-written shares were rolled back.
    #[error("key share creation failed for '{path}': {reason}")]
    CreateFailed { path: String, reason: String },

    /// Fewer than `threshold` shares could be read.
    #[error("key unavailable at '{path}': {available} of {required} shares readable")]
    Unavailable {
        path: String,
        available: usize,
        required: usize,
    },

    /// Fewer than `threshold` backends confirmed the delete.
    #[error("key share deletion incomplete for '{path}': {succeeded} of {required} confirmed")]
    DeleteIncomplete {
        path: String,
        succeeded: usize,
        required: usize,
    },

    /// Share reconstruction failed (malformed or inconsistent shares).
    #[error("key reconstruction failed: {reason}")]
    Reconstruction { reason: String },

    /// The request context was cancelled.
    #[error("operation cancelled")]
    Canceled,
}

/// Errors from the data store adapter.
#[derive(Debug, thiserror::Error)]
pub enum DataStoreError {
    /// An entry already exists at the given path.
    #[error("entry already exists at '{path}'")]
    AlreadyExists { path: String },

    /// No entry exists at the given path.
    #[error("entry not found at '{path}'")]
    NotFound { path: String },

    /// The underlying store failed.
    #[error("data store failure: {reason}")]
    Backend { reason: String },
}

/// Errors from the namespace manager.
#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    /// The namespace path is syntactically invalid.
    #[error("invalid namespace path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A namespace already exists at the given path.
    #[error("namespace already exists at '{path}'")]
    AlreadyExists { path: String },

    /// No namespace exists at the given path.
    #[error("namespace not found at '{path}'")]
    NotFound { path: String },

    /// The parent of the given path does not exist.
    #[error("parent namespace '{parent}' does not exist")]
    ParentNotFound { parent: String },

    /// The namespace still has children and cannot be deleted.
    #[error("namespace '{path}' has children")]
    HasChildren { path: String },

    /// The data store failed.
    #[error("namespace store error: {0}")]
    Store(#[from] DataStoreError),
}

/// Authorization denial. Produced by an
/// [`AuthorizationManager`](crate::context::AuthorizationManager); a pure
/// decision, never a side effect.
#[derive(Debug, thiserror::Error)]
#[error("access denied: operation '{operation}' on '{path}'")]
pub struct AuthzDenied {
    pub operation: Operation,
    pub path: String,
}

/// Errors from configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {reason}")]
    Io { path: String, reason: String },

    /// The configuration document could not be parsed.
    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    /// A required configuration value is absent.
    #[error("missing required config value: {key}")]
    Missing { key: String },

    /// The configuration is structurally invalid.
    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

/// Errors from the secret pipeline and secret-type handlers.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Malformed metadata, missing required field, or bad input.
    #[error("input validation failed: {reason}")]
    InputValidation { reason: String },

    /// The authorization manager denied the operation.
    #[error(transparent)]
    Unauthorized(#[from] AuthzDenied),

    /// A secret type is already registered under this name.
    #[error("secret type already registered: '{name}'")]
    AlreadyRegistered { name: String },

    /// No secret type is registered under this name.
    #[error("unknown secret type: '{name}'")]
    UnknownType { name: String },

    /// A required configuration value for this secret type is absent.
    #[error("missing required config value: {key}")]
    ConfigMissing { key: String },

    /// The request context was cancelled; partial work was compensated.
    #[error("request cancelled")]
    Canceled,

    /// A cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The virtual key store failed.
    #[error(transparent)]
    Vks(#[from] VksError),

    /// The data store failed.
    #[error(transparent)]
    Store(#[from] DataStoreError),

    /// Invariant violation; logged and surfaced, other requests keep serving.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl SecretError {
    /// Fold a VKS error into the pipeline taxonomy, promoting cancellation
    /// to the pipeline-level kind.
    #[must_use]
    pub fn from_vks(err: VksError) -> Self {
        match err {
            VksError::Canceled => Self::Canceled,
            other => Self::Vks(other),
        }
    }
}
