//! Background work dispatch contract
//!
//! Beacon does not own a task engine. The host application supplies one that
//! implements [`WorkDispatcher`] and guarantees:
//!
//! - at most one in-flight execution per `work_id` for [`WorkerType::Serial`]
//!   workers;
//! - a newly dispatched request for a `work_id` that is already queued is
//!   resolved by its [`ConflictPolicy`];
//! - `requires_network` work is held back while the network is unavailable;
//! - a [`WorkResult::Failure`] is retried with the engine's own backoff and a
//!   [`WorkResult::Success`] clears the request.
//!
//! `extras` are passed through to the handler verbatim.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// How to treat a new request when one with the same id is already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Drop the new request if the queued one has not started yet
    KeepIfNotStarted,
    /// Discard the queued request and keep the new one
    Replace,
}

/// Execution discipline for a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerType {
    /// At most one execution per work id at a time
    Serial,
}

/// A unit of deferred background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest {
    /// Identifier of the worker that handles this request
    pub work_id: String,
    /// Opaque parameters passed through to the handler
    pub extras: BTreeMap<String, String>,
    /// Conflict resolution against an already-queued request
    pub conflict_policy: ConflictPolicy,
    /// Delay before the first execution attempt
    pub initial_delay: Duration,
    /// Whether the engine must wait for network availability
    pub requires_network: bool,
}

impl WorkRequest {
    /// New request with no extras, no delay, `KeepIfNotStarted` and network
    /// required.
    pub fn new(work_id: impl Into<String>) -> Self {
        Self {
            work_id: work_id.into(),
            extras: BTreeMap::new(),
            conflict_policy: ConflictPolicy::KeepIfNotStarted,
            initial_delay: Duration::ZERO,
            requires_network: true,
        }
    }

    /// Add an extra parameter.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Set the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set whether the request needs network connectivity.
    pub fn requiring_network(mut self, requires_network: bool) -> Self {
        self.requires_network = requires_network;
        self
    }

    /// Read an extra as a boolean. Absent or unparsable values are `false`.
    pub fn extra_flag(&self, key: &str) -> bool {
        self.extras
            .get(key)
            .and_then(|value| value.parse::<bool>().ok())
            .unwrap_or(false)
    }
}

/// Outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkResult {
    /// Work is complete; the engine clears the request
    Success,
    /// Work should be retried under the engine's backoff policy
    Failure,
}

/// Executes work requests for a registered work id.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    /// Run one execution. Must be idempotent and safe to re-run.
    async fn handle(&self, request: &WorkRequest) -> WorkResult;
}

/// The engine-facing side of the contract.
#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    /// Register the handler for `work_id`.
    async fn register_worker(
        &self,
        work_id: &str,
        worker_type: WorkerType,
        handler: Arc<dyn WorkHandler>,
    );

    /// Queue a request, applying its conflict policy.
    async fn dispatch(&self, request: WorkRequest);
}

#[async_trait]
impl<T: WorkDispatcher + ?Sized> WorkDispatcher for Arc<T> {
    async fn register_worker(
        &self,
        work_id: &str,
        worker_type: WorkerType,
        handler: Arc<dyn WorkHandler>,
    ) {
        (**self).register_worker(work_id, worker_type, handler).await;
    }

    async fn dispatch(&self, request: WorkRequest) {
        (**self).dispatch(request).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_flag_defaults_to_false() {
        let request = WorkRequest::new("registration");
        assert!(!request.extra_flag("forcefully"));

        let request = request.with_extra("forcefully", "yes");
        assert!(!request.extra_flag("forcefully"));

        let request = request.with_extra("forcefully", "true");
        assert!(request.extra_flag("forcefully"));
    }
}
