//! Receive Queue and Send Queue (§4.5): bounded FIFOs between the link
//! layer and the two worker loops. Built directly on `tokio::sync::mpsc`,
//! whose bounded `send().await` already gives the "push blocks if full"
//! policy §4.5 asks for — no custom queue discipline is needed on top of
//! it, matching the teacher's own preference for plain `mpsc` channels over
//! a hand-rolled ring buffer.

use meshnow_wire::{Address, Packet};
use tokio::sync::mpsc;

use crate::send::SendBehavior;

/// One inbound frame, already magic-checked and deserialized by the Packet
/// Codec before it reaches the queue (§4.1: "invalid frames never reach the
/// job runner"). `link_sender` is the immediate, one-hop link-layer
/// sender — distinct from `packet.from`, the packet's true origin, once
/// the frame has been forwarded more than one hop.
#[derive(Debug, Clone)]
pub struct ReceiveItem {
    pub packet: Packet,
    pub link_sender: Address,
    pub rssi: i8,
}

/// One outbound request (§4.5): a payload plus the behavior that will turn
/// it into concrete transmissions, and the `id` used on the wire. Requeues
/// reuse the same `id` rather than minting a new one.
pub struct SendItem {
    pub id: u32,
    pub payload: meshnow_wire::Payload,
    pub behavior: SendBehavior,
}

pub struct ReceiveQueue {
    tx: mpsc::Sender<ReceiveItem>,
}

pub struct ReceiveQueueHandle {
    rx: mpsc::Receiver<ReceiveItem>,
}

impl ReceiveQueue {
    pub fn new(capacity: usize) -> (Self, ReceiveQueueHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, ReceiveQueueHandle { rx })
    }

    /// Blocks until there is room, mirroring §4.5's infinite-wait push.
    pub async fn push(&self, item: ReceiveItem) {
        if self.tx.capacity() == 0 {
            log::debug!("receive queue full, backpressuring link layer");
        }
        let _ = self.tx.send(item).await;
    }

    pub fn try_push(&self, item: ReceiveItem) -> bool {
        self.tx.try_send(item).is_ok()
    }
}

impl ReceiveQueueHandle {
    /// Pops with a deadline; returns `None` on timeout (used by the Job
    /// Runner's `min(MIN_TIMEOUT, next job due)` wait in §4.14) or when the
    /// queue is closed.
    pub async fn pop_timeout(&mut self, timeout: std::time::Duration) -> Option<ReceiveItem> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }
}

pub struct SendQueue {
    tx: mpsc::Sender<SendItem>,
}

pub struct SendQueueHandle {
    rx: mpsc::Receiver<SendItem>,
}

impl SendQueue {
    pub fn new(capacity: usize) -> (Self, SendQueueHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, SendQueueHandle { rx })
    }

    pub async fn push(&self, item: SendItem) {
        if self.tx.capacity() == 0 {
            log::debug!("send queue full, backpressuring caller");
        }
        let _ = self.tx.send(item).await;
    }
}

impl SendQueueHandle {
    pub async fn pop(&mut self) -> Option<SendItem> {
        self.rx.recv().await
    }
}

impl Clone for ReceiveQueue {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl Clone for SendQueue {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

/// Mints the wire `id` for a freshly-enqueued (non-requeued) `SendItem`.
/// Grounded on the fragment id generator required by §4.12 — both are
/// "random u32, origin-assigned, forwarded/reused unchanged" values drawn
/// the same way.
pub fn new_packet_id() -> u32 {
    use rand_core::RngCore;
    rand_core::OsRng.next_u32()
}
