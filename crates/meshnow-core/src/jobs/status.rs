//! Status-Send Job (§4.9): the liveness beacon. Grounded on
//! `original_source/components/meshnow/src/job/keep_alive.hpp`'s
//! `StatusSendJob`, which this mirrors almost verbatim — the one piece of
//! the handshake machinery the original source already fully implements.

use std::time::Instant;

use meshnow_wire::Payload;

use crate::collaborators::{KeyValueStore, LinkLayer};
use crate::config::MeshConfig;
use crate::jobs::JobContext;
use crate::queue::{new_packet_id, SendItem};
use crate::send::SendBehavior;
use crate::state::NodeState;

pub struct StatusJob {
    last_sent_at: Instant,
}

impl StatusJob {
    pub fn new() -> Self {
        Self { last_sent_at: Instant::now() }
    }

    pub fn next_action_at(&self, config: &MeshConfig) -> Option<Instant> {
        Some(self.last_sent_at + config.status_send_interval)
    }

    pub async fn perform_action<L, K>(&mut self, ctx: &mut JobContext<'_, L, K>)
    where
        L: LinkLayer,
        K: KeyValueStore,
    {
        self.last_sent_at = Instant::now();
        if ctx.topology.is_empty() {
            return;
        }
        let state = ctx.state_machine.state();
        let root = if state == NodeState::ReachesRoot { ctx.state_machine.root_mac() } else { None };
        ctx.send_queue
            .push(SendItem {
                id: new_packet_id(),
                payload: Payload::Status { state, root },
                behavior: SendBehavior::neighbors_once(),
            })
            .await;
    }
}

impl Default for StatusJob {
    fn default() -> Self {
        Self::new()
    }
}
