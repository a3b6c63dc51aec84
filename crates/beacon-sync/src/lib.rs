//! # Beacon Sync - Registration and Deferred Resolution
//!
//! Protocol layer on top of `beacon-core`:
//!
//! - [`ChannelRegistrar`]: the registration state machine, run by the host
//!   work engine through the [`WorkHandler`](beacon_core::effects::WorkHandler)
//!   contract
//! - [`ChannelApiClient`]: typed create/update calls against the registry
//! - [`DeferredResolver`]: redirect-aware lookups sharing a [`LocationMap`]
//! - [`RegistrationUpdates`] and [`PayloadExtenders`]: the registrar's
//!   outward and inward extension points

#![forbid(unsafe_code)]

pub mod client;
pub mod extenders;
pub mod identity;
pub mod location;
pub mod registrar;
pub mod resolver;
pub mod updates;

pub use client::{channel_body, ChannelAck, ChannelApiClient, CreateOutcome, UpdateOutcome};
pub use extenders::{ExtenderFn, PayloadExtenders};
pub use identity::{IdentityStore, IDENTITY_KEY, RESTORE_CONSUMED_KEY};
pub use location::LocationMap;
pub use registrar::{
    ChannelRegistrar, RegistrarEffects, FORCEFULLY_EXTRA, REGISTRATION_WORK_ID,
};
pub use resolver::{
    AudienceOverrides, AudienceOverridesProvider, DeferredRequest, DeferredResolver,
    DeferredResult, Locale, NoAudienceOverrides, TriggerContext, MAX_REDIRECT_HOPS,
};
pub use updates::{RegistrationUpdates, DEFAULT_UPDATE_CAPACITY};
