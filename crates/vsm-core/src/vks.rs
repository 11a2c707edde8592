//! Virtual key store: threshold custody of data-encryption keys.
//!
//! Every DEK is split into `n` Shamir shares over GF(2⁸), one per
//! configured key-store backend, and can be reconstructed from any `t` of
//! them. A single backend therefore never holds enough material to recover
//! a key on its own, and up to `n - t` backends may be unreachable without
//! affecting reads.
//!
//! Share wire format: one `x` coordinate byte (backend index + 1) followed
//! by the polynomial evaluations, one byte per DEK byte. With a single
//! configured backend the store degenerates to direct storage and the raw
//! key bytes are written unprefixed.
//!
//! # Security model
//!
//! - Plaintext DEKs and share buffers are zeroized on every exit path,
//!   including shares fetched but not used for reconstruction.
//! - Create and delete serialize per path; reads are lock-free and
//!   idempotent.
//! - Create is best-effort atomic: on any backend failure the
//!   already-written shares are deleted before the error propagates, so a
//!   path is either fully present or must be treated as absent.

use std::sync::Arc;

use sharks::{Share, Sharks};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use vsm_keystore::{KeyStoreBackend, KeyStoreError};

use crate::context::RequestContext;
use crate::crypto::{Dek, DEK_LEN};
use crate::error::VksError;
use crate::locks::PathLocks;

/// A (t, n) threshold store for data-encryption keys.
pub struct VirtualKeyStore {
    backends: Vec<Arc<dyn KeyStoreBackend>>,
    threshold: u8,
    locks: PathLocks,
}

impl VirtualKeyStore {
    /// Build a store over the given backends.
    ///
    /// Backend index is the position in `backends`, which must match the
    /// server configuration's `keyStores` order across restarts.
    ///
    /// # Errors
    ///
    /// Returns [`VksError::InvalidConfig`] unless
    /// `1 <= threshold <= backends.len() <= 255`.
    pub fn new(
        backends: Vec<Arc<dyn KeyStoreBackend>>,
        threshold: usize,
    ) -> Result<Self, VksError> {
        let count = backends.len();
        if count == 0 {
            return Err(VksError::InvalidConfig {
                reason: "at least one key store is required".to_owned(),
            });
        }
        if count > usize::from(u8::MAX) {
            return Err(VksError::InvalidConfig {
                reason: format!("at most 255 key stores are supported, got {count}"),
            });
        }
        if threshold < 1 || threshold > count {
            return Err(VksError::InvalidConfig {
                reason: format!(
                    "threshold must be between 1 and the key store count ({count}), got {threshold}"
                ),
            });
        }
        // Bounds checked above.
        #[allow(clippy::cast_possible_truncation)]
        let threshold = threshold as u8;

        Ok(Self {
            backends,
            threshold,
            locks: PathLocks::new(),
        })
    }

    /// Number of configured backends (`n`).
    #[must_use]
    pub fn share_count(&self) -> usize {
        self.backends.len()
    }

    /// Shares required for reconstruction (`t`).
    #[must_use]
    pub fn threshold(&self) -> usize {
        usize::from(self.threshold)
    }

    /// Split a DEK into one share blob per backend.
    ///
    /// Share `i` is evaluated at `x = i + 1`; the blob is `x || evaluations`.
    fn split(&self, dek: &Dek) -> Vec<Zeroizing<Vec<u8>>> {
        if self.backends.len() == 1 {
            return vec![Zeroizing::new(dek.as_bytes().to_vec())];
        }

        let sharks = Sharks(self.threshold);
        sharks
            .dealer(dek.as_bytes())
            .take(self.backends.len())
            .map(|share| Zeroizing::new(Vec::from(&share)))
            .collect()
    }

    /// Reconstruct a DEK from at least `threshold` share blobs.
    fn combine(&self, blobs: &[Zeroizing<Vec<u8>>]) -> Result<Dek, VksError> {
        if self.backends.len() == 1 {
            let blob = blobs.first().ok_or_else(|| VksError::Reconstruction {
                reason: "no key material available".to_owned(),
            })?;
            let bytes: [u8; DEK_LEN] =
                blob.as_slice()
                    .try_into()
                    .map_err(|_| VksError::Reconstruction {
                        reason: format!("stored key is not {DEK_LEN} bytes"),
                    })?;
            return Ok(Dek::from_bytes(bytes));
        }

        let shares: Vec<Share> = blobs
            .iter()
            .map(|blob| {
                Share::try_from(blob.as_slice()).map_err(|e| VksError::Reconstruction {
                    reason: format!("share deserialization failed: {e}"),
                })
            })
            .collect::<Result<_, _>>()?;

        let sharks = Sharks(self.threshold);
        let recovered = Zeroizing::new(sharks.recover(&shares).map_err(|e| {
            VksError::Reconstruction {
                reason: e.to_owned(),
            }
        })?);

        let bytes: [u8; DEK_LEN] =
            recovered
                .as_slice()
                .try_into()
                .map_err(|_| VksError::Reconstruction {
                    reason: format!("recovered key is not {DEK_LEN} bytes"),
                })?;
        Ok(Dek::from_bytes(bytes))
    }

    /// Split `dek` and write one share to every backend.
    ///
    /// On any backend failure (or observed cancellation) the shares written
    /// so far are deleted before the error propagates.
    ///
    /// # Errors
    ///
    /// - [`VksError::CreateFailed`] if any backend rejects its share.
    /// - [`VksError::Canceled`] if the context is cancelled mid-write.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        path: &str,
        dek: &Dek,
    ) -> Result<(), VksError> {
        let _guard = self.locks.acquire(path).await;

        if ctx.is_cancelled() {
            return Err(VksError::Canceled);
        }

        let shares = self.split(dek);
        for (index, backend) in self.backends.iter().enumerate() {
            if ctx.is_cancelled() {
                self.rollback(path, index).await;
                return Err(VksError::Canceled);
            }
            if let Err(e) = backend.create(path, &shares[index]).await {
                self.rollback(path, index).await;
                return Err(VksError::CreateFailed {
                    path: path.to_owned(),
                    reason: format!("backend {index}: {e}"),
                });
            }
        }
        Ok(())
    }

    /// Delete the shares written to the first `written` backends.
    async fn rollback(&self, path: &str, written: usize) {
        for (index, backend) in self.backends.iter().enumerate().take(written) {
            match backend.delete(path).await {
                Ok(()) | Err(KeyStoreError::NotFound { .. }) => {}
                Err(e) => {
                    warn!(backend = index, path, error = %e, "share rollback failed");
                }
            }
        }
    }

    /// Read shares from all backends concurrently and reconstruct the DEK.
    ///
    /// Completes as soon as `threshold` shares arrive; remaining reads are
    /// aborted and any late results zeroized. Read-only and idempotent.
    ///
    /// # Errors
    ///
    /// - [`VksError::Unavailable`] if fewer than `threshold` backends
    ///   returned a share.
    /// - [`VksError::Canceled`] if the context is cancelled mid-read.
    pub async fn read(&self, ctx: &RequestContext, path: &str) -> Result<Dek, VksError> {
        if ctx.is_cancelled() {
            return Err(VksError::Canceled);
        }

        let required = usize::from(self.threshold);
        let mut set = JoinSet::new();
        for (index, backend) in self.backends.iter().enumerate() {
            let backend = Arc::clone(backend);
            let path = path.to_owned();
            set.spawn(async move { (index, backend.read(&path).await) });
        }

        let mut shares: Vec<Zeroizing<Vec<u8>>> = Vec::with_capacity(required);
        let mut cancelled = false;
        while shares.len() < required {
            let Some(joined) = set.join_next().await else {
                break;
            };
            match joined {
                Ok((_, Ok(bytes))) => shares.push(Zeroizing::new(bytes)),
                Ok((index, Err(e))) => {
                    debug!(backend = index, path, error = %e, "share read failed");
                }
                Err(e) => {
                    warn!(path, error = %e, "share read task failed");
                }
            }
            if ctx.is_cancelled() {
                cancelled = true;
                break;
            }
        }

        // Stop outstanding reads and zeroize anything that was already in
        // flight; those shares will not be used.
        set.abort_all();
        while let Some(joined) = set.join_next().await {
            if let Ok((_, Ok(bytes))) = joined {
                drop(Zeroizing::new(bytes));
            }
        }

        if cancelled {
            return Err(VksError::Canceled);
        }
        if shares.len() < required {
            return Err(VksError::Unavailable {
                path: path.to_owned(),
                available: shares.len(),
                required,
            });
        }
        self.combine(&shares)
    }

    /// Delete the shares for `path` from all backends in parallel.
    ///
    /// Per-backend `NotFound` counts as success, so deletion is idempotent.
    /// At least `threshold` backends must confirm, which guarantees the key
    /// can no longer be reconstructed.
    ///
    /// # Errors
    ///
    /// - [`VksError::DeleteIncomplete`] if fewer than `threshold` backends
    ///   confirmed the delete.
    /// - [`VksError::Canceled`] if the context was already cancelled.
    pub async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<(), VksError> {
        let _guard = self.locks.acquire(path).await;

        if ctx.is_cancelled() {
            return Err(VksError::Canceled);
        }

        let required = usize::from(self.threshold);
        let mut set = JoinSet::new();
        for (index, backend) in self.backends.iter().enumerate() {
            let backend = Arc::clone(backend);
            let path = path.to_owned();
            set.spawn(async move { (index, backend.delete(&path).await) });
        }

        let mut succeeded = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) | Ok((_, Err(KeyStoreError::NotFound { .. }))) => {
                    succeeded = succeeded.saturating_add(1);
                }
                Ok((index, Err(e))) => {
                    warn!(backend = index, path, error = %e, "share delete failed");
                }
                Err(e) => {
                    warn!(path, error = %e, "share delete task failed");
                }
            }
        }

        if succeeded < required {
            return Err(VksError::DeleteIncomplete {
                path: path.to_owned(),
                succeeded,
                required,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for VirtualKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualKeyStore")
            .field("share_count", &self.backends.len())
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}
