//! Connect Job (§4.8): the three-phase handshake state machine —
//! search → connect → done. Grounded on
//! `original_source/components/meshnow/src/job/connect.hpp`'s
//! `SearchPhase`/`ConnectPhase`/`DonePhase` variants and its channel-hopping
//! search loop, finished here with the candidate scoring and retry rules
//! spec.md adds.

use std::time::Instant;

use meshnow_wire::{Address, Payload};

use crate::collaborators::{KeyValueStore, LinkLayer};
use crate::config::MeshConfig;
use crate::jobs::JobContext;
use crate::queue::{new_packet_id, SendItem};
use crate::send::SendBehavior;

const LAST_CHANNEL_KEY: &str = "last_channel";

#[derive(Debug, Clone, Copy)]
struct Candidate {
    address: Address,
    rssi: i8,
}

enum Phase {
    Search { channel: u8, probes_on_channel: u32, last_probe_at: Instant, candidates: Vec<Candidate>, first_parent_found_at: Option<Instant> },
    Connect { candidates: Vec<Candidate>, in_flight: Address, timeout_at: Instant },
    Done,
}

pub struct ConnectJob {
    phase: Phase,
    is_root: bool,
}

impl ConnectJob {
    pub fn new<K: KeyValueStore>(is_root: bool, config: &MeshConfig, kv: &K) -> Self {
        if is_root {
            return Self { phase: Phase::Done, is_root };
        }
        let channel = kv
            .get_u8(LAST_CHANNEL_KEY)
            .filter(|&c| (config.min_channel..=config.max_channel).contains(&c))
            .unwrap_or(config.min_channel);
        Self {
            phase: Phase::Search {
                channel,
                probes_on_channel: 0,
                last_probe_at: Instant::now(),
                candidates: Vec::new(),
                first_parent_found_at: None,
            },
            is_root,
        }
    }

    pub fn next_action_at(&self, config: &MeshConfig) -> Option<Instant> {
        if self.is_root {
            return None;
        }
        match &self.phase {
            Phase::Search { last_probe_at, first_parent_found_at, .. } => {
                let probe_due = *last_probe_at + config.search_probe_interval;
                match first_parent_found_at {
                    Some(found_at) => Some(probe_due.min(*found_at + config.first_parent_wait)),
                    None => Some(probe_due),
                }
            }
            Phase::Connect { timeout_at, .. } => Some(*timeout_at),
            Phase::Done => None,
        }
    }

    pub async fn perform_action<L, K>(&mut self, ctx: &mut JobContext<'_, L, K>)
    where
        L: LinkLayer,
        K: KeyValueStore,
    {
        if self.is_root {
            return;
        }
        let now = Instant::now();
        match &mut self.phase {
            Phase::Search { channel, probes_on_channel, last_probe_at, candidates, first_parent_found_at } => {
                if let Some(found_at) = first_parent_found_at {
                    if now.duration_since(*found_at) >= ctx.config.first_parent_wait {
                        let mut ranked = std::mem::take(candidates);
                        ranked.sort_by_key(|c| std::cmp::Reverse(c.rssi));
                        self.enter_connect(ranked, ctx).await;
                        return;
                    }
                }
                if now.duration_since(*last_probe_at) >= ctx.config.search_probe_interval {
                    ctx.send_queue
                        .push(SendItem {
                            id: new_packet_id(),
                            payload: Payload::SearchProbe,
                            behavior: SendBehavior::direct_once(Address::BROADCAST),
                        })
                        .await;
                    *last_probe_at = now;
                    *probes_on_channel += 1;
                    if *probes_on_channel >= ctx.config.probes_per_channel {
                        *probes_on_channel = 0;
                        *channel = next_channel(*channel, ctx.config);
                        ctx.link.set_channel(*channel);
                    }
                }
            }
            Phase::Connect { candidates, in_flight, timeout_at } => {
                if now >= *timeout_at {
                    if let Some(next) = candidates.pop() {
                        *in_flight = next.address;
                        *timeout_at = now + ctx.config.connect_timeout;
                        ctx.send_queue
                            .push(SendItem {
                                id: new_packet_id(),
                                payload: Payload::ConnectRequest,
                                behavior: SendBehavior::direct_once(next.address),
                            })
                            .await;
                    } else {
                        let channel = match &self.phase {
                            Phase::Connect { .. } => ctx.kv.get_u8(LAST_CHANNEL_KEY).unwrap_or(ctx.config.min_channel),
                            _ => unreachable!(),
                        };
                        self.phase = Phase::Search {
                            channel,
                            probes_on_channel: 0,
                            last_probe_at: now,
                            candidates: Vec::new(),
                            first_parent_found_at: None,
                        };
                    }
                }
            }
            Phase::Done => {}
        }
    }

    async fn enter_connect<L, K>(&mut self, mut candidates: Vec<Candidate>, ctx: &mut JobContext<'_, L, K>)
    where
        L: LinkLayer,
        K: KeyValueStore,
    {
        let now = Instant::now();
        if let Some(first) = candidates.pop() {
            log::debug!("{}: search -> connect, trying {}", ctx.this_mac, first.address);
            self.phase =
                Phase::Connect { candidates, in_flight: first.address, timeout_at: now + ctx.config.connect_timeout };
            ctx.send_queue
                .push(SendItem {
                    id: new_packet_id(),
                    payload: Payload::ConnectRequest,
                    behavior: SendBehavior::direct_once(first.address),
                })
                .await;
        } else {
            self.phase = Phase::Search {
                channel: ctx.kv.get_u8(LAST_CHANNEL_KEY).unwrap_or(ctx.config.min_channel),
                probes_on_channel: 0,
                last_probe_at: now,
                candidates: Vec::new(),
                first_parent_found_at: None,
            };
        }
    }

    /// §4.8's `PARENT_FOUND` handler, invoked by the Packet Handler when a
    /// `SearchReply` arrives from an address not already known to the
    /// topology and we are in Search phase.
    pub fn on_parent_found<K: KeyValueStore>(&mut self, address: Address, rssi: i8, config: &MeshConfig, kv: &K) {
        let Phase::Search { channel, candidates, first_parent_found_at, .. } = &mut self.phase else {
            return;
        };
        if candidates.iter().any(|c| c.address == address) {
            return;
        }
        if candidates.len() >= config.max_parents_to_consider {
            if let Some((weakest_idx, weakest)) =
                candidates.iter().enumerate().min_by_key(|(_, c)| c.rssi)
            {
                if rssi > weakest.rssi {
                    candidates[weakest_idx] = Candidate { address, rssi };
                }
            }
            return;
        }
        candidates.push(Candidate { address, rssi });
        if first_parent_found_at.is_none() {
            *first_parent_found_at = Some(Instant::now());
            kv.set_u8(LAST_CHANNEL_KEY, *channel);
            kv.commit();
        }
    }

    /// §4.8's `GOT_CONNECT_RESPONSE` handler: only meaningful in Connect
    /// phase, and only for the in-flight candidate.
    pub fn on_connect_response(&mut self, parent: Address, root: Address) -> bool {
        match &self.phase {
            Phase::Connect { in_flight, .. } if *in_flight == parent => {
                self.phase = Phase::Done;
                log::info!("connected to parent {parent}, root {root}");
                true
            }
            _ => false,
        }
    }

    /// Restarts the handshake from Search phase (§4.8 Done phase: any
    /// `StateChanged` to `DISCONNECTED_FROM_PARENT` reinitializes
    /// phase-local state) on the same channel we were last using.
    pub fn on_disconnected<K: KeyValueStore>(&mut self, config: &MeshConfig, kv: &K) {
        if self.is_root {
            return;
        }
        let channel = kv
            .get_u8(LAST_CHANNEL_KEY)
            .filter(|&c| (config.min_channel..=config.max_channel).contains(&c))
            .unwrap_or(config.min_channel);
        self.phase = Phase::Search {
            channel,
            probes_on_channel: 0,
            last_probe_at: Instant::now(),
            candidates: Vec::new(),
            first_parent_found_at: None,
        };
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }
}

fn next_channel(current: u8, config: &MeshConfig) -> u8 {
    if current >= config.max_channel {
        config.min_channel
    } else {
        current + 1
    }
}
