//! Hand-driven clock for throttle-window tests.

use async_trait::async_trait;
use beacon_core::effects::{PhysicalTime, PhysicalTimeEffects, TimeError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Controllable wall clock for deterministic testing
#[derive(Clone)]
pub struct ControllableClock {
    current_ms: Arc<Mutex<u64>>,
}

impl ControllableClock {
    /// Create a clock starting at the given Unix milliseconds
    pub fn new(initial_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(Mutex::new(initial_ms)),
        }
    }

    /// Advance time
    pub fn advance(&self, by: Duration) {
        let mut current = self.current_ms.lock().unwrap();
        *current += by.as_millis() as u64;
    }

    /// Set absolute time
    pub fn set_ms(&self, ms: u64) {
        *self.current_ms.lock().unwrap() = ms;
    }

    /// Current time
    pub fn current_ms(&self) -> u64 {
        *self.current_ms.lock().unwrap()
    }
}

impl Default for ControllableClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

#[async_trait]
impl PhysicalTimeEffects for ControllableClock {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(PhysicalTime::from_ms(self.current_ms()))
    }
}
