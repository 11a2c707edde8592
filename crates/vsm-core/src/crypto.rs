//! Cryptographic primitives for VSM.
//!
//! Provides AES-256-GCM authenticated encryption of secret payloads and the
//! zeroize-on-drop data-encryption-key newtype. All key material is cleared
//! from memory when dropped.
//!
//! # Security model
//!
//! - Every encryption generates a fresh 96-bit nonce via `OsRng`.
//! - Ciphertext format: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - A [`Dek`] protects exactly one secret and lives for at most one
//!   request; callers receiving one own it exclusively.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Length of a data-encryption key in bytes.
pub const DEK_LEN: usize = 32;

/// Nonce length for AES-256-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// Minimum ciphertext length: 12-byte nonce + 16-byte AES-GCM tag.
const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + 16;

/// A 256-bit data-encryption key that is zeroized on drop.
///
/// One DEK protects one secret's ciphertext. The inner bytes are never
/// exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Dek([u8; DEK_LEN]);

impl Dek {
    /// Create a DEK from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; DEK_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a new random DEK using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; DEK_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    ///
    /// The caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DEK_LEN] {
        &self.0
    }
}

impl fmt::Debug for Dek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dek").field("bytes", &"[REDACTED]").finish()
    }
}

/// Encrypt plaintext using AES-256-GCM with a fresh random nonce.
///
/// Returns `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn encrypt(plaintext: &[u8], dek: &Dek) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(dek.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    // nonce || ciphertext (tag appended by aes-gcm)
    let mut combined = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if the input cannot contain a
/// nonce and tag, and [`CryptoError::Decryption`] if authentication fails
/// (wrong key, corrupted data, or tampered tag).
pub fn decrypt(combined: &[u8], dek: &Dek) -> Result<Vec<u8>, CryptoError> {
    if combined.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::CiphertextTooShort {
            expected: MIN_CIPHERTEXT_LEN,
            actual: combined.len(),
        });
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(dek.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CryptoError::Decryption {
            reason: e.to_string(),
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let dek = Dek::generate();
        let plaintext = b"secret payload";
        let ciphertext = encrypt(plaintext, &dek).unwrap();
        let decrypted = decrypt(&ciphertext, &dek).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn encrypt_decrypt_empty_plaintext() {
        let dek = Dek::generate();
        let ciphertext = encrypt(b"", &dek).unwrap();
        let decrypted = decrypt(&ciphertext, &dek).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn decrypt_wrong_key_fails() {
        let dek1 = Dek::generate();
        let dek2 = Dek::generate();
        let ciphertext = encrypt(b"secret", &dek1).unwrap();
        let result = decrypt(&ciphertext, &dek2);
        assert!(matches!(result, Err(CryptoError::Decryption { .. })));
    }

    #[test]
    fn decrypt_too_short_fails() {
        let dek = Dek::generate();
        let result = decrypt(&[0u8; 10], &dek);
        assert!(matches!(
            result,
            Err(CryptoError::CiphertextTooShort {
                expected: 28,
                actual: 10
            })
        ));
    }

    #[test]
    fn decrypt_tampered_ciphertext_fails() {
        let dek = Dek::generate();
        let mut ciphertext = encrypt(b"secret", &dek).unwrap();
        if let Some(byte) = ciphertext.get_mut(NONCE_LEN) {
            *byte ^= 0xFF;
        }
        let result = decrypt(&ciphertext, &dek);
        assert!(matches!(result, Err(CryptoError::Decryption { .. })));
    }

    #[test]
    fn two_encryptions_produce_different_ciphertext() {
        let dek = Dek::generate();
        let ct1 = encrypt(b"same data", &dek).unwrap();
        let ct2 = encrypt(b"same data", &dek).unwrap();
        // Different nonces.
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn dek_debug_redacts_bytes() {
        let dek = Dek::generate();
        let debug = format!("{dek:?}");
        assert!(debug.contains("[REDACTED]"));
    }

    proptest! {
        #[test]
        fn roundtrip_holds_for_arbitrary_payloads(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let dek = Dek::generate();
            let ciphertext = encrypt(&payload, &dek).unwrap();
            let decrypted = decrypt(&ciphertext, &dek).unwrap();
            prop_assert_eq!(payload, decrypted);
        }

        #[test]
        fn wrong_key_never_decrypts(payload in proptest::collection::vec(any::<u8>(), 1..512)) {
            let dek = Dek::generate();
            let other = Dek::generate();
            let ciphertext = encrypt(&payload, &dek).unwrap();
            prop_assert!(decrypt(&ciphertext, &other).is_err());
        }
    }
}
