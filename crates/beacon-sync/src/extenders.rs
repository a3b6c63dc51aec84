//! Payload extenders
//!
//! Unrelated modules contribute to the registration payload by registering a
//! pure function. Extenders run in registration order on every execution.

use beacon_core::RegistrationPayload;
use parking_lot::RwLock;
use std::sync::Arc;

/// A payload contribution.
pub type ExtenderFn = dyn Fn(RegistrationPayload) -> RegistrationPayload + Send + Sync;

/// Append-only, ordered list of extenders.
#[derive(Default)]
pub struct PayloadExtenders {
    extenders: RwLock<Vec<Arc<ExtenderFn>>>,
}

impl PayloadExtenders {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extender.
    pub fn add<F>(&self, extender: F)
    where
        F: Fn(RegistrationPayload) -> RegistrationPayload + Send + Sync + 'static,
    {
        self.extenders.write().push(Arc::new(extender));
    }

    /// Number of registered extenders
    pub fn len(&self) -> usize {
        self.extenders.read().len()
    }

    /// Whether no extender is registered
    pub fn is_empty(&self) -> bool {
        self.extenders.read().is_empty()
    }

    /// Fold `base` through every extender in order.
    pub fn apply(&self, base: RegistrationPayload) -> RegistrationPayload {
        // Extenders may register further extenders; never call them under the lock.
        let snapshot: Vec<Arc<ExtenderFn>> = self.extenders.read().clone();
        snapshot
            .iter()
            .fold(base, |payload, extender| extender(payload))
    }
}
