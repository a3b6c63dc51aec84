//! # Beacon Core - Foundation Types
//!
//! Shared vocabulary for the channel registration and deferred resolution
//! layers:
//!
//! - **Channel types**: [`ChannelId`], the persisted [`Identity`], the
//!   [`RegistrationUpdate`] event and [`ChannelCreateMethod`]
//! - **Payload differ**: [`RegistrationPayload::minimize`]
//! - **Status taxonomy**: [`StatusClass`], the one table every remote call
//!   is interpreted through
//! - **Effect traits**: storage, time, HTTP and the work dispatch contract
//! - **Configuration** and the unified [`BeaconError`]
//!
//! This crate performs no I/O of its own.

#![forbid(unsafe_code)]

pub mod channel;
pub mod config;
pub mod effects;
pub mod errors;
pub mod payload;
pub mod status;

pub use channel::{ChannelCreateMethod, ChannelId, Identity, RegistrationUpdate};
pub use config::BeaconConfig;
pub use errors::{BeaconError, Result};
pub use payload::{IdentityHints, PlatformSettings, QuietTime, RegistrationPayload, TagChanges};
pub use status::StatusClass;
