//! Channel identity types
//!
//! A channel is the server-assigned identity of one installed app instance.
//! The registrar persists exactly one [`Identity`] at a time and publishes
//! [`RegistrationUpdate`]s whenever the registry acknowledges a change.

use crate::payload::RegistrationPayload;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Server-assigned channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap a raw identifier as returned by the registry.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id is syntactically acceptable as a restore target.
    ///
    /// Registry ids are UUIDs; anything else is never sent as an update.
    pub fn is_valid_restore_id(&self) -> bool {
        Uuid::parse_str(&self.0).is_ok()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How the first registration obtains a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelCreateMethod {
    /// Ask the registry for a new channel
    #[default]
    Automatic,
    /// Reclaim a previously issued channel
    Restore(ChannelId),
}

/// The locally persisted channel identity.
///
/// Written as a single record only after the registry acknowledged it, so a
/// reader never observes a half-applied update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Channel id acknowledged by the registry
    pub channel_id: ChannelId,
    /// Channel resource URL returned by the registry
    pub location: String,
    /// Last payload the registry acknowledged; the minimisation baseline
    pub last_payload: RegistrationPayload,
    /// Hex SHA-256 of `last_payload`
    pub last_payload_hash: String,
    /// Unix milliseconds of the last acknowledged create/update
    pub last_update_ms: u64,
    /// Set when the registry moved the channel; the next update carries the
    /// full payload instead of a diff against `last_payload`
    #[serde(default)]
    pub requires_full_payload: bool,
}

impl Identity {
    /// Build an identity from an acknowledged payload.
    pub fn acknowledged(
        channel_id: ChannelId,
        location: impl Into<String>,
        payload: RegistrationPayload,
        now_ms: u64,
    ) -> Self {
        let last_payload_hash = payload.payload_hash();
        Self {
            channel_id,
            location: location.into(),
            last_payload: payload,
            last_payload_hash,
            last_update_ms: now_ms,
            requires_full_payload: false,
        }
    }

    /// Mark the next update as a full resync.
    pub fn with_full_payload_required(mut self, required: bool) -> Self {
        self.requires_full_payload = required;
        self
    }
}

/// Event published when the registry acknowledges a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationUpdate {
    /// A channel was created or restored
    Created {
        /// The acknowledged channel id
        channel_id: ChannelId,
        /// `true` when the registry returned an existing channel
        is_existing: bool,
    },
    /// An existing channel was updated
    Updated {
        /// The acknowledged channel id
        channel_id: ChannelId,
    },
}

impl RegistrationUpdate {
    /// Channel id carried by this event.
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            RegistrationUpdate::Created { channel_id, .. }
            | RegistrationUpdate::Updated { channel_id } => channel_id,
        }
    }
}
