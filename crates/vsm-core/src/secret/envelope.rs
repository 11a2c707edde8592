//! The shared secret envelope.
//!
//! Every secret is persisted as the composition of (ciphertext in the data
//! store) + (DEK shares in the virtual key store). These free-standing
//! helpers implement that pipeline once; each secret type calls them after
//! producing its plaintext.
//!
//! Failure handling restores the "fully present or absent" invariant: a
//! key-store failure after the metadata write deletes the metadata again,
//! and a cancellation observed between the two writes (or after both)
//! compensates everything before surfacing `Canceled`. The DEK is owned by
//! the invocation and zeroized on every exit path.

use tracing::warn;

use crate::context::RequestContext;
use crate::crypto::{self, Dek};
use crate::datastore::{secret_id_to_path, DataStoreEntry};
use crate::error::SecretError;
use crate::model::SecretEntry;

use super::SecretTypeInit;

/// Seal `plaintext` under a fresh DEK and persist both envelope halves.
///
/// Returns the entry id.
///
/// # Errors
///
/// - [`SecretError::Store`] if the metadata write fails (including
///   `AlreadyExists` for an occupied id).
/// - [`SecretError::Vks`] if share creation fails; the metadata write is
///   rolled back first.
/// - [`SecretError::Canceled`] if the context is cancelled; partial writes
///   are compensated.
pub async fn seal_secret(
    ctx: &RequestContext,
    init: &SecretTypeInit,
    entry: &SecretEntry,
    plaintext: &[u8],
) -> Result<String, SecretError> {
    if ctx.is_cancelled() {
        return Err(SecretError::Canceled);
    }

    let dek = Dek::generate();
    let ciphertext = crypto::encrypt(plaintext, &dek)?;
    let stored = DataStoreEntry::from_secret_entry(entry, ciphertext);
    let path = stored.path.clone();

    if ctx.is_cancelled() {
        return Err(SecretError::Canceled);
    }
    init.data_store.create_entry(&stored).await?;

    if ctx.is_cancelled() {
        rollback_metadata(init, &path).await;
        return Err(SecretError::Canceled);
    }

    if let Err(e) = init.key_store.create(ctx, &path, &dek).await {
        rollback_metadata(init, &path).await;
        return Err(SecretError::from_vks(e));
    }

    if ctx.is_cancelled() {
        rollback_shares(ctx, init, &path).await;
        rollback_metadata(init, &path).await;
        return Err(SecretError::Canceled);
    }

    Ok(entry.id.clone())
}

/// Read the DEK shares for `entry` and decrypt its ciphertext.
///
/// The caller owns the returned plaintext.
///
/// # Errors
///
/// - [`SecretError::Vks`] if too few shares are readable.
/// - [`SecretError::Crypto`] if decryption fails.
/// - [`SecretError::Canceled`] if the context is cancelled.
pub async fn unseal_secret(
    ctx: &RequestContext,
    init: &SecretTypeInit,
    entry: &SecretEntry,
) -> Result<Vec<u8>, SecretError> {
    if ctx.is_cancelled() {
        return Err(SecretError::Canceled);
    }

    let path = secret_id_to_path(&entry.id);
    let dek = init
        .key_store
        .read(ctx, &path)
        .await
        .map_err(SecretError::from_vks)?;
    let plaintext = crypto::decrypt(&entry.secret_data, &dek)?;
    Ok(plaintext)
}

/// Remove both envelope halves: metadata first, then key shares.
///
/// A metadata failure stops the operation. A share-deletion failure after
/// the metadata is gone is logged and surfaced, but the metadata stays
/// deleted.
///
/// # Errors
///
/// - [`SecretError::Store`] if the metadata delete fails.
/// - [`SecretError::Vks`] if share deletion falls below the threshold.
/// - [`SecretError::Canceled`] if the context is cancelled.
pub async fn remove_secret(
    ctx: &RequestContext,
    init: &SecretTypeInit,
    entry: &SecretEntry,
) -> Result<(), SecretError> {
    if ctx.is_cancelled() {
        return Err(SecretError::Canceled);
    }

    let path = secret_id_to_path(&entry.id);
    init.data_store.delete_entry(&path).await?;

    if let Err(e) = init.key_store.delete(ctx, &path).await {
        warn!(path = %path, error = %e, "share deletion failed after metadata removal");
        return Err(SecretError::from_vks(e));
    }
    Ok(())
}

/// Best-effort removal of the metadata half during compensation.
async fn rollback_metadata(init: &SecretTypeInit, path: &str) {
    if let Err(e) = init.data_store.delete_entry(path).await {
        warn!(path = %path, error = %e, "metadata rollback failed");
    }
}

/// Best-effort removal of already-written shares during compensation.
///
/// Runs under a fresh context: the original one is already cancelled and
/// compensation must still complete.
async fn rollback_shares(ctx: &RequestContext, init: &SecretTypeInit, path: &str) {
    let compensation_ctx = RequestContext::new(ctx.identity().clone());
    if let Err(e) = init.key_store.delete(&compensation_ctx, path).await {
        warn!(path = %path, error = %e, "share rollback failed");
    }
}
