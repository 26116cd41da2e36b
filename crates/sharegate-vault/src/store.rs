//! The two-file credential store.
//!
//! Credentials live in two encrypted files inside the data directory:
//!
//! - `master_auth_config.enc` — one blob holding the master passphrase.
//! - `user_credentials.enc` — one blob holding a JSON map of username to
//!   [`UserRecord`], where each record carries the user's password as a
//!   nested blob. Mutations are read-modify-write of the whole file.
//!
//! Decryption failures are typed, never swallowed: a store that cannot be
//! read reports [`StoreError::DecryptFailed`] or [`StoreError::Corrupt`] so
//! callers can surface the condition instead of pretending the store is
//! empty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crypto::{Vault, constant_time_eq};
use crate::error::StoreError;

/// File holding the encrypted master passphrase.
pub const MASTER_CREDENTIAL_FILE: &str = "master_auth_config.enc";

/// File holding the encrypted user map.
pub const USER_CREDENTIALS_FILE: &str = "user_credentials.enc";

/// Minimum master passphrase length, in characters.
pub const MIN_PASSPHRASE_LEN: usize = 8;

/// One regular user. The password is stored as a blob, decrypted only at
/// verification time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub password_blob: String,
}

/// Username → record, ordered so the admin panel lists users stably.
pub type UserMap = BTreeMap<String, UserRecord>;

/// Outcome of a master passphrase check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterVerdict {
    Match,
    Mismatch,
    /// No master file exists yet; the caller should re-enter setup.
    NotConfigured,
    /// The master file exists but cannot be decrypted.
    DecryptFailed,
}

/// Outcome of a regular-user password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserVerdict {
    Match,
    Mismatch,
    UnknownUser,
    /// The user's password blob cannot be decrypted.
    DecryptFailed,
}

/// Validate a username for the user store.
///
/// At least 3 characters, ASCII alphanumerics plus `_`, `.` and `-`, and not
/// any casing of `master` (reserved for the blank-username login path).
#[must_use]
pub fn validate_username(name: &str) -> bool {
    name.len() >= 3
        && !name.eq_ignore_ascii_case("master")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Handle on the credential files. Cheap to clone; all I/O is per-call.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    master_path: PathBuf,
    users_path: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            master_path: data_dir.join(MASTER_CREDENTIAL_FILE),
            users_path: data_dir.join(USER_CREDENTIALS_FILE),
        }
    }

    /// Whether a master passphrase has been configured.
    pub async fn master_exists(&self) -> bool {
        tokio::fs::try_exists(&self.master_path)
            .await
            .unwrap_or(false)
    }

    /// Whether the user credential file exists at all (distinct from an
    /// empty user map, which is a valid readable state).
    pub async fn users_file_exists(&self) -> bool {
        tokio::fs::try_exists(&self.users_path)
            .await
            .unwrap_or(false)
    }

    /// Encrypt and persist the master passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PassphraseTooShort`] below the minimum length,
    /// [`StoreError::Crypto`] if encryption fails, or [`StoreError::Io`] if
    /// the file cannot be written.
    pub async fn save_master(&self, vault: &Vault, passphrase: &str) -> Result<(), StoreError> {
        if passphrase.chars().count() < MIN_PASSPHRASE_LEN {
            return Err(StoreError::PassphraseTooShort {
                min: MIN_PASSPHRASE_LEN,
            });
        }
        let blob = vault.encrypt(passphrase)?;
        self.write_file(&self.master_path, &blob).await?;
        info!(path = %self.master_path.display(), "master passphrase saved");
        Ok(())
    }

    /// Check a submitted passphrase against the stored master blob.
    ///
    /// The comparison is constant-time. The verdict distinguishes a missing
    /// master file from an unreadable one so callers can route the operator
    /// to setup versus surfacing a key-material problem.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] only for filesystem failures other than
    /// the file being absent.
    pub async fn verify_master(
        &self,
        vault: &Vault,
        submitted: &str,
    ) -> Result<MasterVerdict, StoreError> {
        let blob = match tokio::fs::read_to_string(&self.master_path).await {
            Ok(contents) => contents.trim().to_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MasterVerdict::NotConfigured);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.master_path.display().to_string(),
                    source,
                });
            }
        };
        let Some(stored) = vault.decrypt(&blob) else {
            debug!(path = %self.master_path.display(), "master blob failed decryption");
            return Ok(MasterVerdict::DecryptFailed);
        };
        if constant_time_eq(&stored, submitted) {
            Ok(MasterVerdict::Match)
        } else {
            Ok(MasterVerdict::Mismatch)
        }
    }

    /// Load the user map.
    ///
    /// A missing or empty file is a valid empty map. An unreadable file is
    /// an error, never silently empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DecryptFailed`] if the blob does not decrypt,
    /// [`StoreError::Corrupt`] if the plaintext is not the expected JSON
    /// shape, or [`StoreError::Io`] for filesystem failures.
    pub async fn load_users(&self, vault: &Vault) -> Result<UserMap, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.users_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UserMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.users_path.display().to_string(),
                    source,
                });
            }
        };
        let blob = contents.trim();
        if blob.is_empty() {
            return Ok(UserMap::new());
        }
        let Some(plaintext) = vault.decrypt(blob) else {
            return Err(StoreError::DecryptFailed {
                path: self.users_path.display().to_string(),
            });
        };
        serde_json::from_str(&plaintext).map_err(|e| StoreError::Corrupt {
            path: self.users_path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Encrypt and persist the whole user map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Crypto`] if serialization output cannot be
    /// encrypted or [`StoreError::Io`] if the file cannot be written.
    pub async fn save_users(&self, vault: &Vault, users: &UserMap) -> Result<(), StoreError> {
        let plaintext = serde_json::to_string_pretty(users).map_err(|e| StoreError::Corrupt {
            path: self.users_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let blob = vault.encrypt(&plaintext)?;
        self.write_file(&self.users_path, &blob).await
    }

    /// Create an empty user file if none exists yet. Called after setup so
    /// the first user login distinguishes "no users" from "no file".
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from [`CredentialStore::save_users`].
    pub async fn ensure_users_file(&self, vault: &Vault) -> Result<(), StoreError> {
        if self.users_file_exists().await {
            return Ok(());
        }
        self.save_users(vault, &UserMap::new()).await
    }

    /// Check a submitted password for a named user.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from [`CredentialStore::load_users`]; a
    /// per-record decryption failure is a verdict, not an error.
    pub async fn verify_user(
        &self,
        vault: &Vault,
        username: &str,
        submitted: &str,
    ) -> Result<UserVerdict, StoreError> {
        let users = self.load_users(vault).await?;
        let Some(record) = users.get(username) else {
            return Ok(UserVerdict::UnknownUser);
        };
        let Some(stored) = vault.decrypt(&record.password_blob) else {
            debug!(username, "user password blob failed decryption");
            return Ok(UserVerdict::DecryptFailed);
        };
        if constant_time_eq(&stored, submitted) {
            Ok(UserVerdict::Match)
        } else {
            Ok(UserVerdict::Mismatch)
        }
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, contents).await.map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(io_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crypto::EncryptionKey;

    fn fixture() -> (tempfile::TempDir, Vault, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Vault::new(EncryptionKey::generate());
        let store = CredentialStore::new(dir.path());
        (dir, vault, store)
    }

    #[tokio::test]
    async fn master_roundtrip() {
        let (_dir, vault, store) = fixture();
        assert!(!store.master_exists().await);
        store.save_master(&vault, "correct horse").await.unwrap();
        assert!(store.master_exists().await);
        assert_eq!(
            store.verify_master(&vault, "correct horse").await.unwrap(),
            MasterVerdict::Match
        );
        assert_eq!(
            store.verify_master(&vault, "wrong horse!!").await.unwrap(),
            MasterVerdict::Mismatch
        );
    }

    #[tokio::test]
    async fn master_too_short_rejected() {
        let (_dir, vault, store) = fixture();
        let err = store.save_master(&vault, "short").await.unwrap_err();
        assert!(matches!(err, StoreError::PassphraseTooShort { min: 8 }));
        assert!(!store.master_exists().await);
    }

    #[tokio::test]
    async fn master_missing_is_not_configured() {
        let (_dir, vault, store) = fixture();
        assert_eq!(
            store.verify_master(&vault, "anything").await.unwrap(),
            MasterVerdict::NotConfigured
        );
    }

    #[tokio::test]
    async fn master_wrong_key_is_decrypt_failed() {
        let (_dir, vault, store) = fixture();
        store.save_master(&vault, "correct horse").await.unwrap();
        let other = Vault::new(EncryptionKey::generate());
        assert_eq!(
            store.verify_master(&other, "correct horse").await.unwrap(),
            MasterVerdict::DecryptFailed
        );
    }

    #[tokio::test]
    async fn users_missing_file_is_empty_map() {
        let (_dir, vault, store) = fixture();
        assert!(store.load_users(&vault).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn users_roundtrip_and_verify() {
        let (_dir, vault, store) = fixture();
        let mut users = UserMap::new();
        users.insert(
            "alice".to_owned(),
            UserRecord {
                password_blob: vault.encrypt("alice-pass").unwrap(),
            },
        );
        store.save_users(&vault, &users).await.unwrap();

        let loaded = store.load_users(&vault).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            store.verify_user(&vault, "alice", "alice-pass").await.unwrap(),
            UserVerdict::Match
        );
        assert_eq!(
            store.verify_user(&vault, "alice", "not-it").await.unwrap(),
            UserVerdict::Mismatch
        );
        assert_eq!(
            store.verify_user(&vault, "bob", "whatever").await.unwrap(),
            UserVerdict::UnknownUser
        );
    }

    #[tokio::test]
    async fn tampered_users_file_is_decrypt_failed() {
        let (dir, vault, store) = fixture();
        store.save_users(&vault, &UserMap::new()).await.unwrap();
        let path = dir.path().join(USER_CREDENTIALS_FILE);
        let mut blob = tokio::fs::read_to_string(&path).await.unwrap();
        blob.truncate(blob.len() - 4);
        blob.push_str("0000");
        tokio::fs::write(&path, blob).await.unwrap();
        assert!(matches!(
            store.load_users(&vault).await,
            Err(StoreError::DecryptFailed { .. })
        ));
    }

    #[tokio::test]
    async fn non_json_plaintext_is_corrupt() {
        let (dir, vault, store) = fixture();
        let blob = vault.encrypt("this is not json").unwrap();
        tokio::fs::write(dir.path().join(USER_CREDENTIALS_FILE), blob)
            .await
            .unwrap();
        assert!(matches!(
            store.load_users(&vault).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn ensure_users_file_is_idempotent() {
        let (_dir, vault, store) = fixture();
        store.ensure_users_file(&vault).await.unwrap();
        assert!(store.users_file_exists().await);
        let mut users = UserMap::new();
        users.insert(
            "carol".to_owned(),
            UserRecord {
                password_blob: vault.encrypt("pw").unwrap(),
            },
        );
        store.save_users(&vault, &users).await.unwrap();
        // A second ensure must not wipe existing users.
        store.ensure_users_file(&vault).await.unwrap();
        assert_eq!(store.load_users(&vault).await.unwrap().len(), 1);
    }

    #[test]
    fn username_validation() {
        assert!(validate_username("alice"));
        assert!(validate_username("a.b-c_9"));
        assert!(!validate_username("ab"));
        assert!(!validate_username("master"));
        assert!(!validate_username("MASTER"));
        assert!(!validate_username("with space"));
        assert!(!validate_username("emoji😀name"));
        assert!(!validate_username(""));
    }
}
