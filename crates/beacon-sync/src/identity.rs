//! Persisted channel identity
//!
//! The whole [`Identity`] is one JSON blob under one key, so every commit is
//! all-or-nothing and at most one identity exists at a time.

use beacon_core::effects::StorageEffects;
use beacon_core::{BeaconError, Identity, Result};
use std::sync::Arc;
use tracing::warn;

/// Storage key of the identity record.
pub const IDENTITY_KEY: &str = "beacon.channel.identity";

/// Storage key set once a first registration has committed. It outlives
/// identity resets so a configured restore id is only ever tried once.
pub const RESTORE_CONSUMED_KEY: &str = "beacon.channel.restore_consumed";

/// Reads and writes the single identity record.
#[derive(Clone)]
pub struct IdentityStore {
    storage: Arc<dyn StorageEffects>,
}

impl IdentityStore {
    /// Wrap a storage handler
    pub fn new(storage: Arc<dyn StorageEffects>) -> Self {
        Self { storage }
    }

    /// Load the identity. A record that no longer decodes is treated as
    /// absent so the next registration recreates it.
    pub async fn load(&self) -> Result<Option<Identity>> {
        let Some(bytes) = self.storage.retrieve(IDENTITY_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_slice::<Identity>(&bytes) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                warn!(error = %e, "discarding undecodable channel identity");
                Ok(None)
            }
        }
    }

    /// Replace the identity.
    pub async fn save(&self, identity: &Identity) -> Result<()> {
        let bytes = serde_json::to_vec(identity)
            .map_err(|e| BeaconError::serialization(format!("identity: {e}")))?;
        self.storage.store(IDENTITY_KEY, bytes).await?;
        Ok(())
    }

    /// Remove the identity. Returns whether one existed.
    pub async fn clear(&self) -> Result<bool> {
        Ok(self.storage.remove(IDENTITY_KEY).await?)
    }

    /// Whether a first registration has already committed.
    pub async fn restore_consumed(&self) -> Result<bool> {
        Ok(self.storage.retrieve(RESTORE_CONSUMED_KEY).await?.is_some())
    }

    /// Record that the first-registration branch is done.
    pub async fn mark_restore_consumed(&self) -> Result<()> {
        self.storage
            .store(RESTORE_CONSUMED_KEY, b"true".to_vec())
            .await?;
        Ok(())
    }
}
