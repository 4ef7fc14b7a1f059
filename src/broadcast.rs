//! Outward delivery of round updates
//!
//! The orchestrator only needs a fire-and-forget `broadcast(message)`. The
//! default implementation publishes to a tokio broadcast channel; subscribers
//! that lag behind lose messages, which is acceptable for live updates.

use tokio::sync::broadcast;
use tracing::trace;

use crate::messages::Message;

pub trait Broadcaster: Send + Sync {
    /// Deliver a message at most once to every current subscriber
    fn broadcast(&self, message: Message);
}

/// [`Broadcaster`] backed by a tokio broadcast channel
#[derive(Clone)]
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<Message>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast(&self, message: Message) {
        // No subscribers is fine, nobody is watching yet.
        match self.tx.send(message) {
            Ok(num_receivers) => trace!("published round update to {num_receivers} receivers"),
            Err(_) => trace!("no receivers for round update"),
        }
    }
}
