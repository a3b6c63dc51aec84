//! Registration update fan-out
//!
//! Multi-subscriber broadcast of [`RegistrationUpdate`]s. Subscribers only see
//! events published after they subscribed; events reach every subscriber in
//! publication order.

use beacon_core::RegistrationUpdate;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

/// Default number of buffered events per subscriber.
pub const DEFAULT_UPDATE_CAPACITY: usize = 64;

/// Broadcast channel for registration updates.
#[derive(Clone)]
pub struct RegistrationUpdates {
    sender: broadcast::Sender<RegistrationUpdate>,
}

impl RegistrationUpdates {
    /// Create with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_UPDATE_CAPACITY)
    }

    /// Create with a custom per-subscriber buffer
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future updates.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationUpdate> {
        self.sender.subscribe()
    }

    /// Subscribe as a `Stream`. Lagged subscribers see a `Lagged` error item.
    pub fn stream(&self) -> BroadcastStream<RegistrationUpdate> {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Publish an update. Returns the number of subscribers that received it.
    pub fn publish(&self, update: RegistrationUpdate) -> usize {
        match self.sender.send(update) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("registration update published with no subscribers");
                0
            }
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RegistrationUpdates {
    fn default() -> Self {
        Self::new()
    }
}
