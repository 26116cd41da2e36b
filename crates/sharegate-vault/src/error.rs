//! Error types for `sharegate-vault`.
//!
//! Each variant carries enough context to diagnose the problem without a
//! debugger. No variant ever includes key material or a submitted passphrase —
//! only file paths and operation descriptions.

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// scrypt key derivation failed.
    #[error("key derivation failed: {reason}")]
    KeyDerivation { reason: String },
}

/// Errors from the on-disk credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing a credential file failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The master passphrase does not meet the minimum length.
    #[error("master passphrase must be at least {min} characters")]
    PassphraseTooShort { min: usize },

    /// A credential blob failed authenticated decryption. The key material
    /// changed or the file was modified on disk.
    #[error("cannot decrypt {path}: key material changed or file tampered")]
    DecryptFailed { path: String },

    /// A credential file decrypted but does not parse as the expected shape.
    #[error("credential file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    /// A cryptographic operation failed while writing credentials.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
