//! Cryptographic primitives for the Sharegate vault.
//!
//! Provides scrypt key derivation from the operator's key-material file and
//! AES-256-GCM authenticated encryption of credential blobs. All key material
//! is cleared from memory when dropped.
//!
//! # Security model
//!
//! - Every encryption generates a fresh 96-bit nonce via `OsRng`; blobs never
//!   share a nonce.
//! - Blob wire format: `hex(nonce) ":" hex(ciphertext || tag)`.
//! - Decryption fails closed: any malformed, truncated, or tampered blob
//!   yields `None`, with the reason confined to a log line.
//! - Key derivation uses scrypt with a fixed application salt, so the same
//!   key-material file always derives the same key.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Nonce length for AES-256-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// Fixed scrypt salt. The key-material file is the secret; the salt only
/// domain-separates this derivation from any other scrypt use.
const SCRYPT_SALT: &[u8] = b"sharegate-scrypt-derivation-v1";

/// scrypt cost parameters: N = 2^15, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// A 256-bit encryption key that is zeroized on drop.
///
/// The inner bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    ///
    /// Use with care — the caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the vault key from the key-material file contents.
///
/// Deterministic: the same material always yields the same key. This call is
/// deliberately slow (scrypt N = 2^15); run it once at startup, off the async
/// runtime.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if the scrypt parameters or output
/// length are rejected (should not happen with the constants above).
pub fn derive_key(key_material: &str) -> Result<EncryptionKey, CryptoError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32).map_err(|e| {
        CryptoError::KeyDerivation {
            reason: e.to_string(),
        }
    })?;
    let mut derived = [0u8; 32];
    scrypt::scrypt(key_material.as_bytes(), SCRYPT_SALT, &params, &mut derived).map_err(|e| {
        CryptoError::KeyDerivation {
            reason: e.to_string(),
        }
    })?;
    Ok(EncryptionKey::from_bytes(derived))
}

/// Constant-time string equality for passphrase comparison.
///
/// Length is compared first (length leaks are inherent to the format); the
/// byte comparison itself never short-circuits.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// The encryption barrier for credential blobs.
///
/// Wraps the derived key and speaks the `hex(nonce):hex(ciphertext)` blob
/// format used by the credential files.
pub struct Vault {
    key: EncryptionKey,
}

impl Vault {
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypt a plaintext string into a blob.
    ///
    /// Every call uses a fresh random nonce, so encrypting the same plaintext
    /// twice yields different blobs.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext =
            cipher
                .encrypt(&nonce, plaintext.as_bytes())
                .map_err(|e| CryptoError::Encryption {
                    reason: e.to_string(),
                })?;
        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    /// Decrypt a blob produced by [`Vault::encrypt`].
    ///
    /// Fails closed: returns `None` for any malformed blob, wrong key, or
    /// tampered ciphertext. The specific reason is logged at `debug` and
    /// never surfaced to callers.
    #[must_use]
    pub fn decrypt(&self, blob: &str) -> Option<String> {
        let Some((nonce_hex, ciphertext_hex)) = blob.split_once(':') else {
            tracing::debug!("blob is missing the nonce separator");
            return None;
        };
        let Ok(nonce_bytes) = hex::decode(nonce_hex) else {
            tracing::debug!("blob nonce is not valid hex");
            return None;
        };
        if nonce_bytes.len() != NONCE_LEN {
            tracing::debug!(len = nonce_bytes.len(), "blob nonce has the wrong length");
            return None;
        }
        let Ok(ciphertext) = hex::decode(ciphertext_hex) else {
            tracing::debug!("blob ciphertext is not valid hex");
            return None;
        };

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let nonce = Nonce::from_slice(&nonce_bytes);
        let Ok(plaintext) = cipher.decrypt(nonce, ciphertext.as_slice()) else {
            tracing::debug!("blob failed authenticated decryption");
            return None;
        };
        match String::from_utf8(plaintext) {
            Ok(s) => Some(s),
            Err(_) => {
                tracing::debug!("decrypted blob is not valid UTF-8");
                None
            }
        }
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault").finish_non_exhaustive()
    }
}
