//! Event Bus (§4.4): single-writer, multi-reader notification channel for
//! cross-component events and the external `PARENT_CONNECTED` /
//! `PARENT_DISCONNECTED` surface (§6). Grounded on
//! `styrene-rns-transport::transport::links::Links::out_link_events`, which
//! exposes the same `tokio::sync::broadcast` pattern for fanning link
//! events out to any number of listeners — the idiomatic Rust rendition of
//! the ESP-IDF `esp_event` base/id/handler/arg subscription model named in
//! §9 (dropping the `Receiver` is the idempotent unsubscribe).

use meshnow_wire::{Address, NodeState};
use tokio::sync::broadcast;

/// A tagged event, delivered in publish order to every live subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StateChanged { old: NodeState, new: NodeState },
    ParentFound { address: Address, rssi: i8 },
    GotConnectResponse { parent: Address, root: Address },
    ParentConnected { parent: Address },
    ParentDisconnected { parent: Address },
}

/// Bounded (capacity 16 per §4.4) broadcast channel. Cloning an `EventBus`
/// shares the same underlying channel; every clone can publish.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to every current subscriber. A full channel drops
    /// the oldest unread event for lagging subscribers rather than
    /// blocking the publisher — `broadcast`'s standard backpressure, chosen
    /// over a bounded `mpsc` because control-plane events (state changes)
    /// must fan out to every consumer, not be load-balanced across one.
    pub fn publish(&self, event: Event) {
        // No receivers is not an error: nothing is subscribed yet.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
