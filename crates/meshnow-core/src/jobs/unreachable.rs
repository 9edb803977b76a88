//! Unreachable-Timeout Job (§4.11): the root-unreachable grace period that
//! follows a parent's `REACHES_ROOT -> CONNECTED_TO_PARENT` demotion.
//! Grounded on `original_source/components/meshnow/src/job/keep_alive.hpp`'s
//! `UnreachableTimeoutJob`, completed with the timer spec.md adds.

use std::time::Instant;

use crate::collaborators::{KeyValueStore, LinkLayer};
use crate::config::MeshConfig;
use crate::event::Event;
use crate::jobs::JobContext;
use crate::state::NodeState;

#[derive(Default)]
pub struct UnreachableTimeoutJob {
    armed_at: Option<Instant>,
}

impl UnreachableTimeoutJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the grace timer. Called by the Packet Handler on the
    /// `REACHES_ROOT -> CONNECTED_TO_PARENT` edge.
    pub fn arm(&mut self) {
        self.armed_at = Some(Instant::now());
    }

    /// Clears the timer. Called when the state returns to `REACHES_ROOT`
    /// before it expires.
    pub fn disarm(&mut self) {
        self.armed_at = None;
    }

    pub fn next_action_at(&self, config: &MeshConfig) -> Option<Instant> {
        self.armed_at.map(|at| at + config.root_unreachable_timeout)
    }

    pub async fn perform_action<L, K>(&mut self, ctx: &mut JobContext<'_, L, K>)
    where
        L: LinkLayer,
        K: KeyValueStore,
    {
        let Some(armed_at) = self.armed_at else { return };
        if Instant::now().duration_since(armed_at) < ctx.config.root_unreachable_timeout {
            return;
        }
        self.armed_at = None;
        if ctx.state_machine.state() != NodeState::ConnectedToParent {
            return;
        }
        let Some(parent) = ctx.topology.parent().map(|p| p.address) else { return };
        log::warn!("{}: root-unreachable grace period expired, giving up on parent {}", ctx.this_mac, parent);
        ctx.topology.remove_parent();
        let (old, new) = ctx.state_machine.transition(NodeState::DisconnectedFromParent, None);
        ctx.event_bus.publish(Event::StateChanged { old, new });
        ctx.event_bus.publish(Event::ParentDisconnected { parent });
    }
}
