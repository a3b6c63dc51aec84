//! Wall-clock time effect.
//!
//! Throttling decisions compare Unix milliseconds, so the registrar takes its
//! clock as an effect and tests can drive it explicitly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type for time operations.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum TimeError {
    /// Clock source could not be read
    #[error("Time service unavailable")]
    ServiceUnavailable,
    /// Other failure
    #[error("Operation failed: {reason}")]
    OperationFailed {
        /// Underlying reason
        reason: String,
    },
}

impl From<TimeError> for crate::BeaconError {
    fn from(err: TimeError) -> Self {
        crate::BeaconError::internal(err.to_string())
    }
}

/// A physical timestamp in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysicalTime {
    /// Milliseconds since the Unix epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Wrap a millisecond timestamp.
    pub fn from_ms(ts_ms: u64) -> Self {
        Self { ts_ms }
    }
}

/// Wall-clock source.
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current wall-clock time.
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError>;

    /// Current Unix timestamp in milliseconds.
    async fn now_ms(&self) -> Result<u64, TimeError> {
        Ok(self.physical_time().await?.ts_ms)
    }
}

#[async_trait]
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for std::sync::Arc<T> {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        (**self).physical_time().await
    }
}
