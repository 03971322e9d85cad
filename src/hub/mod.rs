//! Broadcast hub: fan-out of device events to WebSocket subscribers
//!
//! Events are serialized once and pushed through a bounded broadcast channel.
//! A subscriber that falls behind loses the overflowed events instead of
//! holding up the publisher; reconnecting gives it a fresh snapshot.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::HubEvent;
use crate::state::StateStore;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Arc<str>>,
    store: StateStore,
    poll_sec: f64,
}

/// A registered subscriber: its initial snapshot plus the live event feed.
pub struct Subscription {
    pub snapshot: Arc<str>,
    receiver: broadcast::Receiver<Arc<str>>,
}

impl Subscription {
    /// Next event, skipping over anything dropped while lagging.
    /// Returns `None` once the hub is gone.
    pub async fn next_message(&mut self) -> Option<Arc<str>> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("[Hub] Subscriber lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl BroadcastHub {
    pub fn new(store: StateStore, poll_sec: f64, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            store,
            poll_sec,
        }
    }

    /// Push an event to every current subscriber. Returns how many received it.
    pub fn broadcast(&self, event: &HubEvent) -> usize {
        let msg = match serde_json::to_string(event) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!("[Hub] Failed to serialize event: {}", e);
                return 0;
            }
        };

        // Err only means nobody is listening
        self.tx.send(Arc::from(msg)).unwrap_or(0)
    }

    /// Register a subscriber and build its snapshot.
    ///
    /// The feed is attached before the snapshot is read, so no update can fall
    /// between the two.
    pub async fn subscribe(&self) -> Result<Subscription, serde_json::Error> {
        let receiver = self.tx.subscribe();
        let snapshot = HubEvent::Snapshot {
            state: self.store.snapshot(self.poll_sec).await,
        };
        let snapshot = serde_json::to_string(&snapshot)?;

        Ok(Subscription {
            snapshot: Arc::from(snapshot),
            receiver,
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn poll_sec(&self) -> f64 {
        self.poll_sec
    }
}
