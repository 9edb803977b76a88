//! Job Runner (§4.14) and the `Job` tagged union (§4.8–§4.11) it drives.
//! Jobs share the shape `{ next_action_at() -> tick, perform_action() }`
//! named in spec §9's own note that virtual-base-class "Jobs" are better
//! expressed as a variant-dispatched enum — the same choice the teacher
//! makes for its transport-level background tasks.

pub mod connect;
pub mod fragment_gc;
pub mod neighbor_check;
pub mod status;
pub mod unreachable;

use std::time::Instant;

use meshnow_wire::Address;

pub use connect::ConnectJob;
pub use fragment_gc::FragmentGcJob;
pub use neighbor_check::NeighborCheckJob;
pub use status::StatusJob;
pub use unreachable::UnreachableTimeoutJob;

use crate::collaborators::{KeyValueStore, LinkLayer};
use crate::config::MeshConfig;
use crate::event::EventBus;
use crate::fragment::FragmentTable;
use crate::queue::SendQueue;
use crate::state::StateMachine;
use crate::topology::Topology;

/// Everything a job's `perform_action` may touch, all already behind the
/// single global lock (§5) by the time the Job Runner constructs one of
/// these.
pub struct JobContext<'a, L, K> {
    pub this_mac: Address,
    pub is_root: bool,
    pub config: &'a MeshConfig,
    pub topology: &'a mut Topology,
    pub state_machine: &'a mut StateMachine,
    pub fragments: &'a mut FragmentTable,
    pub event_bus: &'a EventBus,
    pub send_queue: &'a SendQueue,
    pub link: &'a L,
    pub kv: &'a K,
}

pub enum Job {
    Connect(ConnectJob),
    Status(StatusJob),
    NeighborCheck(NeighborCheckJob),
    Unreachable(UnreachableTimeoutJob),
    FragmentGc(FragmentGcJob),
}

impl Job {
    /// `topology` and `fragments` are read-only here — the Job Runner
    /// evaluates every job's due time under the same lock it uses for
    /// `perform_action`, but a query never mutates state (§4.14 step 1).
    pub fn next_action_at(&self, config: &MeshConfig, topology: &Topology, fragments: &FragmentTable) -> Option<Instant> {
        match self {
            Self::Connect(job) => job.next_action_at(config),
            Self::Status(job) => job.next_action_at(config),
            Self::NeighborCheck(job) => job.next_action_at(config, topology),
            Self::Unreachable(job) => job.next_action_at(config),
            Self::FragmentGc(job) => job.next_action_at(config, fragments),
        }
    }

    pub async fn perform_action<L, K>(&mut self, ctx: &mut JobContext<'_, L, K>)
    where
        L: LinkLayer,
        K: KeyValueStore,
    {
        match self {
            Self::Connect(job) => job.perform_action(ctx).await,
            Self::Status(job) => job.perform_action(ctx).await,
            Self::NeighborCheck(job) => job.perform_action(ctx).await,
            Self::Unreachable(job) => job.perform_action(ctx).await,
            Self::FragmentGc(job) => job.perform_action(ctx).await,
        }
    }
}
