//! Key/value storage effect
//!
//! The persistence engine is opaque to Beacon: the registrar only needs to
//! write and read whole blobs under string keys.

use crate::BeaconError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors reported by storage handlers.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum StorageError {
    /// Reading a key failed
    #[error("Failed to read '{key}': {reason}")]
    ReadFailed {
        /// Key being read
        key: String,
        /// Underlying reason
        reason: String,
    },
    /// Writing a key failed
    #[error("Failed to write '{key}': {reason}")]
    WriteFailed {
        /// Key being written
        key: String,
        /// Underlying reason
        reason: String,
    },
    /// Key is empty, too long or unsafe as a file name
    #[error("Invalid storage key: {reason}")]
    InvalidKey {
        /// Underlying reason
        reason: String,
    },
    /// Handler could not be constructed
    #[error("Storage configuration error: {reason}")]
    ConfigurationError {
        /// Underlying reason
        reason: String,
    },
}

impl From<StorageError> for BeaconError {
    fn from(err: StorageError) -> Self {
        BeaconError::storage(err.to_string())
    }
}

/// Opaque key/value persistence.
#[async_trait]
pub trait StorageEffects: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Read the value stored under `key`.
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove `key`. Returns whether a value was present.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Whether a value is stored under `key`.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.retrieve(key).await?.is_some())
    }
}

#[async_trait]
impl<T: StorageEffects + ?Sized> StorageEffects for std::sync::Arc<T> {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        (**self).store(key, value).await
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).retrieve(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        (**self).remove(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        (**self).exists(key).await
    }
}
