//! Neighbor-Check Job (§4.10): the keep-alive sweep over the parent and
//! every direct child. Grounded on
//! `original_source/components/meshnow/src/job/keep_alive.hpp`'s
//! `NeighborCheckJob` timeout-scan shape.

use std::time::Instant;

use meshnow_wire::Payload;

use crate::collaborators::{KeyValueStore, LinkLayer};
use crate::config::MeshConfig;
use crate::event::Event;
use crate::jobs::JobContext;
use crate::queue::{new_packet_id, SendItem};
use crate::send::SendBehavior;
use crate::state::NodeState;
use crate::topology::Topology;

pub struct NeighborCheckJob;

impl NeighborCheckJob {
    pub fn new() -> Self {
        Self
    }

    /// Next action = `min(neighbor.last_seen) + KEEP_ALIVE_TIMEOUT` (§4.10).
    /// `None` while there are no neighbors to watch.
    pub fn next_action_at(&self, config: &MeshConfig, topology: &Topology) -> Option<Instant> {
        let oldest = std::iter::once(topology.parent().map(|p| p.last_seen))
            .flatten()
            .chain(topology.children().iter().map(|c| c.neighbor.last_seen))
            .min()?;
        Some(oldest + config.keep_alive_timeout)
    }

    pub async fn perform_action<L, K>(&mut self, ctx: &mut JobContext<'_, L, K>)
    where
        L: LinkLayer,
        K: KeyValueStore,
    {
        let now = Instant::now();
        let timeout = ctx.config.keep_alive_timeout;

        let parent_lost = ctx
            .topology
            .parent()
            .map(|p| now.duration_since(p.last_seen) > timeout)
            .unwrap_or(false);

        let lost_children: Vec<_> = ctx
            .topology
            .children()
            .iter()
            .filter(|c| now.duration_since(c.neighbor.last_seen) > timeout)
            .map(|c| c.address())
            .collect();

        if parent_lost {
            let parent = ctx.topology.parent().map(|p| p.address);
            log::warn!("{}: keep-alive timeout, parent {:?} is gone", ctx.this_mac, parent);
            ctx.topology.remove_parent();
            let (old, new) = ctx.state_machine.transition(NodeState::DisconnectedFromParent, None);
            ctx.event_bus.publish(Event::StateChanged { old, new });
            if let Some(parent) = parent {
                ctx.event_bus.publish(Event::ParentDisconnected { parent });
            }
        }

        for child in lost_children {
            log::warn!("{}: keep-alive timeout, child {} is gone", ctx.this_mac, child);
            ctx.topology.remove_child(child);
            ctx.send_queue
                .push(SendItem {
                    id: new_packet_id(),
                    payload: Payload::RoutingTableRemove { entry: child },
                    behavior: SendBehavior::upstream_retry(),
                })
                .await;
        }
    }
}

impl Default for NeighborCheckJob {
    fn default() -> Self {
        Self::new()
    }
}
