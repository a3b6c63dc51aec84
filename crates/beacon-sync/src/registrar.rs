//! Channel registrar
//!
//! Owns the registration state machine. The persisted [`Identity`] is the
//! state: absent means unregistered, present means registered. Every
//! execution is driven by the work engine through the [`WorkHandler`] impl,
//! one at a time, and commits at most one identity write followed by at most
//! one [`RegistrationUpdate`].
//!
//! ```text
//! Unregistered --create 200/201--> Registered --update 200--> Registered
//!      ^                                |
//!      +-------- update 404/409 --------+
//! ```
//!
//! Nothing is written until the registry has answered, so dropping an
//! in-flight execution leaves the identity exactly as it was.

use crate::client::{ChannelAck, ChannelApiClient, CreateOutcome, UpdateOutcome};
use crate::extenders::PayloadExtenders;
use crate::identity::IdentityStore;
use crate::updates::RegistrationUpdates;
use async_trait::async_trait;
use beacon_core::effects::{
    ConflictPolicy, HttpEffects, PhysicalTimeEffects, StorageEffects, WorkDispatcher,
    WorkHandler, WorkRequest, WorkResult, WorkerType,
};
use beacon_core::{
    BeaconConfig, BeaconError, ChannelCreateMethod, ChannelId, Identity, RegistrationPayload,
    RegistrationUpdate, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Work id of the registration job.
pub const REGISTRATION_WORK_ID: &str = "registration";

/// Work request extra carrying the `forcefully` flag.
pub const FORCEFULLY_EXTRA: &str = "forcefully";

/// Effect handlers the registrar runs on.
#[derive(Clone)]
pub struct RegistrarEffects {
    /// Identity persistence
    pub storage: Arc<dyn StorageEffects>,
    /// Registry transport
    pub http: Arc<dyn HttpEffects>,
    /// Wall clock for the throttle window
    pub time: Arc<dyn PhysicalTimeEffects>,
    /// Host work engine
    pub dispatcher: Arc<dyn WorkDispatcher>,
}

/// Channel registration state machine.
pub struct ChannelRegistrar {
    config: Arc<BeaconConfig>,
    client: ChannelApiClient,
    identity: IdentityStore,
    time: Arc<dyn PhysicalTimeEffects>,
    dispatcher: Arc<dyn WorkDispatcher>,
    extenders: PayloadExtenders,
    updates: RegistrationUpdates,
}

impl ChannelRegistrar {
    /// Create a registrar. The config is validated here so a bad config
    /// fails at startup rather than on the first execution.
    pub fn new(config: BeaconConfig, effects: RegistrarEffects) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            client: ChannelApiClient::new(config.clone(), effects.http),
            identity: IdentityStore::new(effects.storage),
            time: effects.time,
            dispatcher: effects.dispatcher,
            extenders: PayloadExtenders::new(),
            updates: RegistrationUpdates::new(),
            config,
        })
    }

    /// Register this registrar as the serial worker for
    /// [`REGISTRATION_WORK_ID`].
    pub async fn register_worker(self: &Arc<Self>) {
        let handler: Arc<dyn WorkHandler> = self.clone();
        self.dispatcher
            .register_worker(REGISTRATION_WORK_ID, WorkerType::Serial, handler)
            .await;
    }

    /// The configuration in effect
    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    /// Subscribe to acknowledged registrations.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationUpdate> {
        self.updates.subscribe()
    }

    /// The update broadcaster
    pub fn updates(&self) -> &RegistrationUpdates {
        &self.updates
    }

    /// Append a payload extender.
    pub fn add_extender<F>(&self, extender: F)
    where
        F: Fn(RegistrationPayload) -> RegistrationPayload + Send + Sync + 'static,
    {
        self.extenders.add(extender);
    }

    /// The persisted identity, if registered.
    pub async fn identity(&self) -> Result<Option<Identity>> {
        self.identity.load().await
    }

    /// The acknowledged channel id, if registered.
    pub async fn channel_id(&self) -> Result<Option<ChannelId>> {
        Ok(self.identity.load().await?.map(|identity| identity.channel_id))
    }

    /// Ask the work engine to run a registration. A no-op while the
    /// registry is not configured.
    pub async fn register(&self, forcefully: bool) {
        if !self.config.is_remote_configured() {
            debug!("registry not configured; registration skipped");
            return;
        }

        let policy = if forcefully {
            ConflictPolicy::Replace
        } else {
            ConflictPolicy::KeepIfNotStarted
        };
        let request = WorkRequest::new(REGISTRATION_WORK_ID)
            .with_extra(FORCEFULLY_EXTRA, forcefully.to_string())
            .with_conflict_policy(policy)
            .with_initial_delay(Duration::ZERO)
            .requiring_network(true);
        self.dispatcher.dispatch(request).await;
    }

    /// Run one registration execution.
    ///
    /// `Ok(Failure)` asks the engine to retry; `Err` is reserved for local
    /// faults such as storage errors or a missing registry URL.
    #[instrument(skip(self), level = "debug")]
    pub async fn perform_registration(&self, forcefully: bool) -> Result<WorkResult> {
        if !self.config.is_remote_configured() {
            return Err(BeaconError::configuration(
                "registration requires device_api_url",
            ));
        }

        let payload = self.extenders.apply(self.base_payload()).snapshot();
        match self.identity.load().await? {
            None => self.register_new(payload).await,
            Some(identity) => self.update_existing(identity, payload, forcefully).await,
        }
    }

    fn base_payload(&self) -> RegistrationPayload {
        RegistrationPayload {
            app_version: self.config.app_version.clone(),
            sdk_version: Some(self.config.sdk_version.clone()),
            locale_language: self.config.locale_language.clone(),
            locale_country: self.config.locale_country.clone(),
            ..RegistrationPayload::new(self.config.platform.clone())
        }
    }

    async fn register_new(&self, payload: RegistrationPayload) -> Result<WorkResult> {
        if let ChannelCreateMethod::Restore(restore_id) = &self.config.channel_create_method {
            if self.identity.restore_consumed().await? {
                debug!(restore_id = %restore_id, "restore already used; creating");
            } else if restore_id.is_valid_restore_id() {
                if let Some(result) = self.restore(restore_id, &payload).await? {
                    return Ok(result);
                }
            } else {
                warn!(restore_id = %restore_id, "restore id is not a channel id; creating");
            }
        }
        self.create(payload).await
    }

    /// Reclaim `restore_id`. `None` means the registry refused it and a new
    /// channel should be created instead.
    async fn restore(
        &self,
        restore_id: &ChannelId,
        payload: &RegistrationPayload,
    ) -> Result<Option<WorkResult>> {
        let body = payload.minimize(Some(&RegistrationPayload::default()));
        match self.client.update(restore_id, &body).await? {
            UpdateOutcome::Updated(ack) => {
                let location = self.location_or_canonical(&ack)?;
                let channel_id = ack.channel_id;
                self.commit(&channel_id, location, payload.clone(), false)
                    .await?;
                info!(channel_id = %channel_id, "channel restored");
                self.updates.publish(RegistrationUpdate::Created {
                    channel_id,
                    is_existing: true,
                });
                Ok(Some(WorkResult::Success))
            }
            UpdateOutcome::ChannelInvalid { status } | UpdateOutcome::Rejected { status } => {
                info!(restore_id = %restore_id, status, "restore refused; creating");
                Ok(None)
            }
            UpdateOutcome::Retry { status, .. } => {
                debug!(?status, "restore failed; will retry");
                Ok(Some(WorkResult::Failure))
            }
        }
    }

    async fn create(&self, payload: RegistrationPayload) -> Result<WorkResult> {
        match self.client.create(&payload).await? {
            CreateOutcome::Created { ack, is_existing } => {
                let location = self.location_or_canonical(&ack)?;
                let channel_id = ack.channel_id;
                self.commit(&channel_id, location, payload, false).await?;
                info!(channel_id = %channel_id, is_existing, "channel created");
                self.updates.publish(RegistrationUpdate::Created {
                    channel_id,
                    is_existing,
                });
                Ok(WorkResult::Success)
            }
            CreateOutcome::Rejected { status } => {
                warn!(status, "channel create rejected; not retrying");
                Ok(WorkResult::Success)
            }
            CreateOutcome::Retry { status, .. } => {
                debug!(?status, "channel create failed; will retry");
                Ok(WorkResult::Failure)
            }
        }
    }

    async fn update_existing(
        &self,
        identity: Identity,
        payload: RegistrationPayload,
        forcefully: bool,
    ) -> Result<WorkResult> {
        let now_ms = self.time.now_ms().await?;
        let unchanged = !identity.requires_full_payload
            && payload.payload_hash() == identity.last_payload_hash;
        let elapsed = Duration::from_millis(now_ms.saturating_sub(identity.last_update_ms));
        if unchanged && !forcefully && elapsed < self.config.update_interval() {
            debug!(channel_id = %identity.channel_id, ?elapsed, "payload unchanged; update skipped");
            return Ok(WorkResult::Success);
        }

        let body = if identity.requires_full_payload {
            payload.clone()
        } else {
            payload.minimize(Some(&identity.last_payload))
        };

        match self.client.update(&identity.channel_id, &body).await? {
            UpdateOutcome::Updated(ack) => {
                let location = ack
                    .location
                    .clone()
                    .unwrap_or_else(|| identity.location.clone());
                let moved = location != identity.location;
                if moved {
                    info!(from = %identity.location, to = %location, "channel location changed");
                }
                let channel_id = ack.channel_id;
                self.commit_at(&channel_id, location, payload, moved, now_ms)
                    .await?;
                debug!(channel_id = %channel_id, "channel updated");
                self.updates
                    .publish(RegistrationUpdate::Updated { channel_id });
                Ok(WorkResult::Success)
            }
            UpdateOutcome::ChannelInvalid { status } => {
                warn!(channel_id = %identity.channel_id, status, "channel no longer valid; clearing identity");
                self.identity.clear().await?;
                Ok(WorkResult::Failure)
            }
            UpdateOutcome::Rejected { status } => {
                warn!(channel_id = %identity.channel_id, status, "channel update rejected; dropping");
                Ok(WorkResult::Success)
            }
            UpdateOutcome::Retry { status, .. } => {
                debug!(?status, "channel update failed; will retry");
                Ok(WorkResult::Failure)
            }
        }
    }

    fn location_or_canonical(&self, ack: &ChannelAck) -> Result<String> {
        match &ack.location {
            Some(location) => Ok(location.clone()),
            None => self.config.channel_location(&ack.channel_id),
        }
    }

    /// Commit a first registration (create or restore).
    async fn commit(
        &self,
        channel_id: &ChannelId,
        location: String,
        payload: RegistrationPayload,
        requires_full_payload: bool,
    ) -> Result<()> {
        let now_ms = self.time.now_ms().await?;
        self.commit_at(channel_id, location, payload, requires_full_payload, now_ms)
            .await?;
        self.identity.mark_restore_consumed().await
    }

    async fn commit_at(
        &self,
        channel_id: &ChannelId,
        location: String,
        payload: RegistrationPayload,
        requires_full_payload: bool,
        now_ms: u64,
    ) -> Result<()> {
        let identity = Identity::acknowledged(channel_id.clone(), location, payload, now_ms)
            .with_full_payload_required(requires_full_payload);
        self.identity.save(&identity).await
    }
}

#[async_trait]
impl WorkHandler for ChannelRegistrar {
    async fn handle(&self, request: &WorkRequest) -> WorkResult {
        let forcefully = request.extra_flag(FORCEFULLY_EXTRA);
        match self.perform_registration(forcefully).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "channel registration failed");
                WorkResult::Failure
            }
        }
    }
}
