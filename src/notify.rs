//! Fire-and-forget change notifications.
//!
//! Delivery is not guaranteed: with no subscriber, or a subscriber that has
//! fallen behind, events are dropped and the sender never waits or retries.

use tokio::sync::broadcast;
use tracing::trace;

pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// The staged snapshot was replaced by a capture or import.
    StagedDataChanged { count: usize },
}

#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<StageEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<StageEvent> {
        self.sender.subscribe()
    }

    /// Best-effort send. Never blocks, never fails.
    pub fn notify(&self, event: StageEvent) {
        if self.sender.send(event).is_err() {
            trace!("No listeners for stage event");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(16)
    }
}
