//! Filesystem storage handler
//!
//! One file per key under a base directory. Writes go to a temporary file
//! that is synced and renamed over the target, so a reader sees either the
//! old value or the new one.

use async_trait::async_trait;
use beacon_core::effects::{StorageEffects, StorageError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Maximum accepted key length.
const MAX_KEY_LEN: usize = 120;

/// Filesystem-backed key/value storage.
#[derive(Debug, Clone)]
pub struct FilesystemStorageHandler {
    base_path: PathBuf,
}

impl FilesystemStorageHandler {
    /// Create a handler rooted at `base_path`, creating the directory.
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| StorageError::ConfigurationError {
                reason: format!("Failed to create {}: {e}", base_path.display()),
            })?;
        Ok(Self { base_path })
    }

    /// Root directory of this handler.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn validate_key(key: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey {
                reason: "Key cannot be empty".to_string(),
            });
        }
        if key.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey {
                reason: format!("Key too long (max {MAX_KEY_LEN} characters)"),
            });
        }
        Ok(())
    }

    /// Hex-encode the key so any string maps to a safe file name.
    fn key_to_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.dat", hex::encode(key)))
    }

    async fn write_atomic(&self, key: &str, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let write_failed = |reason: String| StorageError::WriteFailed {
            key: key.to_string(),
            reason,
        };

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| write_failed(format!("Failed to create temp file: {e}")))?;
        file.write_all(data)
            .await
            .map_err(|e| write_failed(format!("Failed to write data: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| write_failed(format!("Failed to sync: {e}")))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(|e| write_failed(format!("Failed to rename temp file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl StorageEffects for FilesystemStorageHandler {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        Self::validate_key(key)?;
        let path = self.key_to_path(key);
        self.write_atomic(key, &path, &value).await?;
        debug!(key, bytes = value.len(), "stored value");
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Self::validate_key(key)?;
        match fs::read(self.key_to_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Self::validate_key(key)?;
        match fs::remove_file(self.key_to_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
