//! Fragment GC job (§4.12): sweeps the Fragment Reassembly table for
//! entries that timed out before completion. Grounded on the same
//! oldest-entry-plus-sweep-interval pattern as the Neighbor-Check Job,
//! applied to `FragmentTable` instead of `Topology`.

use std::time::Instant;

use crate::collaborators::{KeyValueStore, LinkLayer};
use crate::config::MeshConfig;
use crate::fragment::FragmentTable;
use crate::jobs::JobContext;

#[derive(Default)]
pub struct FragmentGcJob;

impl FragmentGcJob {
    pub fn new() -> Self {
        Self
    }

    pub fn next_action_at(&self, config: &MeshConfig, fragments: &FragmentTable) -> Option<Instant> {
        fragments.oldest_last_touched().map(|oldest| oldest + config.fragment_timeout)
    }

    pub async fn perform_action<L, K>(&mut self, ctx: &mut JobContext<'_, L, K>)
    where
        L: LinkLayer,
        K: KeyValueStore,
    {
        ctx.fragments.sweep(ctx.config.fragment_timeout);
    }
}
