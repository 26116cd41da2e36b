//! Key-material bootstrap.
//!
//! The vault key is derived from a single file of operator-owned key
//! material. On first start the file is generated from the OS CSPRNG; after
//! that it must never change, or every credential blob becomes unreadable.

use std::path::Path;

use rand::RngCore;
use tracing::{info, warn};

use crate::error::StoreError;

/// Default file name for the key material, kept next to the credential files.
pub const KEY_MATERIAL_FILE: &str = "encryption.secret.key";

/// Bytes of CSPRNG output used when generating fresh key material
/// (hex-encoded on disk, so the file holds twice this many characters).
const GENERATED_KEY_BYTES: usize = 48;

/// Shorter material still works, but gets a startup warning.
const RECOMMENDED_MIN_LEN: usize = 64;

/// Load the key material, generating it on first start.
///
/// Surrounding whitespace is trimmed so a trailing newline from a text
/// editor does not silently derive a different key. Generated files are
/// written with mode 0600 on unix.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the file exists but cannot be read, or if
/// a fresh file cannot be written.
pub async fn load_or_create(path: &Path) -> Result<String, StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let material = contents.trim().to_owned();
            if material.len() < RECOMMENDED_MIN_LEN {
                warn!(
                    path = %path.display(),
                    len = material.len(),
                    "key material is shorter than the recommended {RECOMMENDED_MIN_LEN} characters"
                );
            }
            info!(path = %path.display(), "loaded encryption key material");
            Ok(material)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let mut bytes = [0u8; GENERATED_KEY_BYTES];
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            let material = hex::encode(bytes);

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            tokio::fs::write(path, &material).await.map_err(io_err)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                    .await
                    .map_err(io_err)?;
            }

            info!(path = %path.display(), "generated new encryption key material");
            warn!(
                path = %path.display(),
                "back this file up: losing it makes every stored credential permanently unreadable"
            );
            Ok(material)
        }
        Err(source) => Err(io_err(source)),
    }
}
