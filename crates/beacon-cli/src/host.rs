//! In-process host: effect wiring and a minimal work engine.

use anyhow::{Context, Result};
use async_trait::async_trait;
use beacon_core::effects::{
    ConflictPolicy, WorkDispatcher, WorkHandler, WorkRequest, WorkResult, WorkerType,
};
use beacon_core::BeaconConfig;
use beacon_effects::{FilesystemStorageHandler, RealTimeHandler, ReqwestHttpHandler};
use beacon_sync::{ChannelRegistrar, RegistrarEffects};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts per request before the CLI gives up.
const MAX_ATTEMPTS: u32 = 3;

/// First retry delay; doubled after each failure.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Work engine that runs queued requests when the CLI drains it.
///
/// Keeps one pending request per work id and applies conflict policies on
/// enqueue. Requests run one after another. Connectivity is not tracked, so
/// network-bound work runs immediately, and worker types are only logged.
#[derive(Default)]
pub struct InlineWorkDispatcher {
    workers: Mutex<HashMap<String, Arc<dyn WorkHandler>>>,
    queue: Mutex<VecDeque<WorkRequest>>,
}

impl InlineWorkDispatcher {
    /// Empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued request to completion or until attempts run out.
    pub async fn drain(&self) -> Vec<(String, WorkResult)> {
        let mut results = Vec::new();
        loop {
            let Some(request) = self.queue.lock().pop_front() else {
                break;
            };
            let handler = self.workers.lock().get(&request.work_id).cloned();
            let Some(handler) = handler else {
                warn!(work_id = %request.work_id, "no worker registered; dropping request");
                continue;
            };

            if request.requires_network {
                debug!(work_id = %request.work_id, "running network-bound work without a connectivity check");
            }
            if !request.initial_delay.is_zero() {
                tokio::time::sleep(request.initial_delay).await;
            }

            let mut result = WorkResult::Failure;
            for attempt in 0..MAX_ATTEMPTS {
                if attempt > 0 {
                    let backoff = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    debug!(work_id = %request.work_id, attempt, ?backoff, "retrying work");
                    tokio::time::sleep(backoff).await;
                }
                result = handler.handle(&request).await;
                if result == WorkResult::Success {
                    break;
                }
            }
            results.push((request.work_id, result));
        }
        results
    }
}

#[async_trait]
impl WorkDispatcher for InlineWorkDispatcher {
    async fn register_worker(
        &self,
        work_id: &str,
        worker_type: WorkerType,
        handler: Arc<dyn WorkHandler>,
    ) {
        debug!(work_id, ?worker_type, "worker registered");
        self.workers.lock().insert(work_id.to_string(), handler);
    }

    async fn dispatch(&self, request: WorkRequest) {
        let mut queue = self.queue.lock();
        match queue.iter().position(|queued| queued.work_id == request.work_id) {
            Some(index) if request.conflict_policy == ConflictPolicy::Replace => {
                queue[index] = request;
            }
            Some(_) => debug!(work_id = %request.work_id, "request already pending"),
            None => queue.push_back(request),
        }
    }
}

/// Default state directory: `~/.beacon`.
pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".beacon")
}

/// Default config file: `~/.beacon/config.toml`.
pub fn default_config_path() -> PathBuf {
    default_state_dir().join("config.toml")
}

/// Load config from `path`, overlay `BEACON_*` variables, validate.
pub fn load_config(path: &Path) -> Result<BeaconConfig> {
    let mut config = BeaconConfig::load_from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.merge_with_env();
    config.validate()?;
    Ok(config)
}

/// A registrar wired to production handlers.
pub struct Host {
    /// Registration state machine
    pub registrar: Arc<ChannelRegistrar>,
    /// Engine the registrar dispatches to
    pub dispatcher: Arc<InlineWorkDispatcher>,
    /// Shared HTTP handler
    pub http: Arc<ReqwestHttpHandler>,
}

impl Host {
    /// Open on-disk state and wire the registrar.
    pub async fn new(config: BeaconConfig) -> Result<Self> {
        let state_dir = config
            .storage_path
            .clone()
            .unwrap_or_else(default_state_dir)
            .join("state");
        let storage = FilesystemStorageHandler::new(&state_dir)
            .await
            .with_context(|| format!("opening state directory {}", state_dir.display()))?;
        info!(state_dir = %state_dir.display(), "state directory ready");

        let http = Arc::new(ReqwestHttpHandler::new()?);
        let dispatcher = Arc::new(InlineWorkDispatcher::new());
        let registrar = Arc::new(ChannelRegistrar::new(
            config,
            RegistrarEffects {
                storage: Arc::new(storage),
                http: http.clone(),
                time: Arc::new(RealTimeHandler::new()),
                dispatcher: dispatcher.clone(),
            },
        )?);
        registrar.register_worker().await;

        Ok(Self {
            registrar,
            dispatcher,
            http,
        })
    }
}
