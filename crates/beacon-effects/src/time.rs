//! Wall-clock time handler for production use.

use async_trait::async_trait;
use beacon_core::effects::{PhysicalTime, PhysicalTimeEffects, TimeError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Real time handler delegating to the system clock.
#[derive(Debug, Clone, Default)]
pub struct RealTimeHandler;

impl RealTimeHandler {
    /// Create a new real time handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for RealTimeHandler {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TimeError::ServiceUnavailable)?;
        Ok(PhysicalTime::from_ms(elapsed.as_millis() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clock_is_after_2020() {
        let now = RealTimeHandler::new().now_ms().await.unwrap();
        assert!(now > 1_577_836_800_000);
    }
}
