//! In-memory work engine
//!
//! Holds at most one pending request per work id, applies conflict policies
//! the way a real scheduler would, and only runs network-bound work while the
//! simulated network is up. Failed executions go back on the queue unless a
//! newer request for the same id arrived meanwhile.

use async_trait::async_trait;
use beacon_core::effects::{
    ConflictPolicy, WorkDispatcher, WorkHandler, WorkRequest, WorkResult, WorkerType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct Registration {
    worker_type: WorkerType,
    handler: Arc<dyn WorkHandler>,
}

/// Work dispatcher double.
pub struct RecordingWorkDispatcher {
    workers: Mutex<HashMap<String, Registration>>,
    pending: Mutex<Vec<WorkRequest>>,
    dispatched: Mutex<Vec<WorkRequest>>,
    network_available: AtomicBool,
}

impl RecordingWorkDispatcher {
    /// Create a dispatcher with the network up
    pub fn new() -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            dispatched: Mutex::new(Vec::new()),
            network_available: AtomicBool::new(true),
        }
    }

    /// Simulate connectivity changes
    pub fn set_network_available(&self, available: bool) {
        self.network_available.store(available, Ordering::SeqCst);
    }

    /// Every request passed to `dispatch`, in order
    pub fn dispatched(&self) -> Vec<WorkRequest> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Requests waiting to run
    pub fn pending(&self) -> Vec<WorkRequest> {
        self.pending.lock().unwrap().clone()
    }

    /// Worker type registered for `work_id`
    pub fn worker_type(&self, work_id: &str) -> Option<WorkerType> {
        self.workers
            .lock()
            .unwrap()
            .get(work_id)
            .map(|registration| registration.worker_type)
    }

    /// Run every pending request once, in queue order.
    pub async fn run_pending(&self) -> Vec<(String, WorkResult)> {
        let runnable: Vec<WorkRequest> = {
            let network = self.network_available.load(Ordering::SeqCst);
            let mut pending = self.pending.lock().unwrap();
            let (runnable, blocked): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|request| network || !request.requires_network);
            *pending = blocked;
            runnable
        };

        let mut results = Vec::with_capacity(runnable.len());
        for request in runnable {
            let handler = self
                .workers
                .lock()
                .unwrap()
                .get(&request.work_id)
                .map(|registration| registration.handler.clone());
            let Some(handler) = handler else {
                tracing::warn!(work_id = %request.work_id, "no worker registered");
                self.requeue(request);
                continue;
            };

            let result = handler.handle(&request).await;
            if result == WorkResult::Failure {
                self.requeue(request.clone());
            }
            results.push((request.work_id, result));
        }
        results
    }

    fn requeue(&self, request: WorkRequest) {
        let mut pending = self.pending.lock().unwrap();
        if !pending.iter().any(|queued| queued.work_id == request.work_id) {
            pending.push(request);
        }
    }
}

impl Default for RecordingWorkDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkDispatcher for RecordingWorkDispatcher {
    async fn register_worker(
        &self,
        work_id: &str,
        worker_type: WorkerType,
        handler: Arc<dyn WorkHandler>,
    ) {
        self.workers.lock().unwrap().insert(
            work_id.to_string(),
            Registration {
                worker_type,
                handler,
            },
        );
    }

    async fn dispatch(&self, request: WorkRequest) {
        self.dispatched.lock().unwrap().push(request.clone());
        let mut pending = self.pending.lock().unwrap();
        match pending
            .iter()
            .position(|queued| queued.work_id == request.work_id)
        {
            Some(index) => match request.conflict_policy {
                ConflictPolicy::KeepIfNotStarted => {}
                ConflictPolicy::Replace => pending[index] = request,
            },
            None => pending.push(request),
        }
    }
}
