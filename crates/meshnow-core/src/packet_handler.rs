//! Packet Handler (§4.13): per-variant dispatch for every inbound packet,
//! and sole authority over topology mutations driven by remote events.
//! Grounded on `original_source/components/meshnow/src/packet_handler.cpp`'s
//! variant-switch dispatcher, completed with the full routing and
//! handshake rules spec.md specifies (the original stubs most of these
//! with `// TODO`).

use meshnow_wire::{Address, NodeState, Packet, Payload};

use crate::callbacks::CallbackRegistry;
use crate::collaborators::{IpStackAdapter, KeyValueStore, LinkLayer};
use crate::config::MeshConfig;
use crate::dedup::DedupCache;
use crate::event::{Event, EventBus};
use crate::fragment::FragmentTable;
use crate::jobs::{ConnectJob, UnreachableTimeoutJob};
use crate::queue::{new_packet_id, SendItem};
use crate::send::SendBehavior;
use crate::state::StateMachine;
use crate::topology::Topology;

pub struct PacketHandlerCtx<'a, L, K> {
    pub this_mac: Address,
    pub is_root: bool,
    pub config: &'a MeshConfig,
    pub topology: &'a mut Topology,
    pub state_machine: &'a mut StateMachine,
    pub fragments: &'a mut FragmentTable,
    pub dedup: &'a mut DedupCache,
    pub connect_job: &'a mut ConnectJob,
    pub unreachable_job: &'a mut UnreachableTimeoutJob,
    pub event_bus: &'a EventBus,
    pub send_queue: &'a crate::queue::SendQueue,
    pub link: &'a L,
    pub kv: &'a K,
    pub ip_stack: &'a dyn IpStackAdapter,
    pub data_callbacks: &'a CallbackRegistry,
}

pub async fn handle_packet<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, packet: Packet, link_sender: Address, rssi: i8)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    log::trace!("{}: << {} from {} via {}", ctx.this_mac, payload_kind(&packet.payload), packet.from, link_sender);

    let for_us = packet.to == ctx.this_mac
        || packet.to.is_broadcast()
        || (packet.to.is_root_sentinel() && ctx.is_root);

    if !for_us {
        forward(ctx, &packet, link_sender).await;
        return;
    }
    if packet.to.is_broadcast() {
        // Broadcasts are both consumed locally and forwarded, but a replay
        // of one we have already seen is dropped outright — neither
        // re-forwarded nor re-delivered.
        if ctx.dedup.check_and_insert(packet.from, packet.id) {
            return;
        }
        forward(ctx, &packet, link_sender).await;
    }

    dispatch_local(ctx, &packet, link_sender, rssi).await;
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Status { .. } => "status",
        Payload::SearchProbe => "search_probe",
        Payload::SearchReply => "search_reply",
        Payload::ConnectRequest => "connect_request",
        Payload::ConnectOk { .. } => "connect_ok",
        Payload::RoutingTableAdd { .. } => "routing_table_add",
        Payload::RoutingTableRemove { .. } => "routing_table_remove",
        Payload::RootUnreachable => "root_unreachable",
        Payload::RootReachable { .. } => "root_reachable",
        Payload::DataFragment { .. } => "data_fragment",
        Payload::CustomData { .. } => "custom_data",
    }
}

async fn forward<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, packet: &Packet, link_sender: Address)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    ctx.send_queue
        .push(SendItem {
            id: packet.id,
            payload: packet.payload.clone(),
            behavior: SendBehavior::fully_resolve(packet.from, packet.to, Some(link_sender)),
        })
        .await;
}

async fn dispatch_local<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, packet: &Packet, link_sender: Address, rssi: i8)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    match &packet.payload {
        Payload::Status { state, root } => on_status(ctx, packet.from, *state, *root),
        Payload::SearchProbe => on_search_probe(ctx, packet.from).await,
        Payload::SearchReply => on_search_reply(ctx, packet.from, rssi),
        Payload::ConnectRequest => on_connect_request(ctx, packet.from).await,
        Payload::ConnectOk { root } => on_connect_ok(ctx, packet.from, *root),
        Payload::RoutingTableAdd { entry } => on_routing_table_add(ctx, packet.from, *entry).await,
        Payload::RoutingTableRemove { entry } => on_routing_table_remove(ctx, packet.from, *entry).await,
        Payload::RootUnreachable => on_root_unreachable(ctx, packet.from).await,
        Payload::RootReachable { root } => on_root_reachable(ctx, packet.from, *root).await,
        Payload::DataFragment { frag_id, frag_num, total_size, data } => {
            on_data_fragment(ctx, packet.from, *frag_id, *frag_num, *total_size, data)
        }
        Payload::CustomData { data } => ctx.data_callbacks.dispatch(packet.from, data),
    }
    let _ = link_sender;
}

fn on_status<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address, state: NodeState, root: Option<Address>)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    let is_parent = ctx.topology.parent().map(|p| p.address) == Some(from);
    if !is_parent && !ctx.topology.has_child(from) {
        return;
    }
    ctx.topology.touch(from);
    if !is_parent {
        return;
    }

    match (ctx.state_machine.state(), state) {
        (NodeState::ConnectedToParent, NodeState::ReachesRoot) if root.is_some() => {
            let (old, new) = ctx.state_machine.transition(NodeState::ReachesRoot, root);
            ctx.event_bus.publish(Event::StateChanged { old, new });
            ctx.unreachable_job.disarm();
        }
        (NodeState::ReachesRoot, NodeState::ConnectedToParent) => {
            let (old, new) = ctx.state_machine.transition(NodeState::ConnectedToParent, None);
            ctx.event_bus.publish(Event::StateChanged { old, new });
            ctx.unreachable_job.arm();
        }
        _ => {}
    }
}

async fn on_search_probe<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    if ctx.state_machine.state() != NodeState::ReachesRoot {
        return;
    }
    if ctx.topology.has(from) {
        return;
    }
    if !ctx.topology.has_capacity() {
        return;
    }
    ctx.send_queue
        .push(SendItem { id: new_packet_id(), payload: Payload::SearchReply, behavior: SendBehavior::direct_once(from) })
        .await;
}

fn on_search_reply<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address, rssi: i8)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    if ctx.topology.has(from) {
        return;
    }
    ctx.connect_job.on_parent_found(from, rssi, ctx.config, ctx.kv);
    ctx.event_bus.publish(Event::ParentFound { address: from, rssi });
}

async fn on_connect_request<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    if ctx.state_machine.state() != NodeState::ReachesRoot {
        return;
    }
    if ctx.topology.has(from) {
        return;
    }
    if !ctx.topology.has_capacity() {
        return;
    }
    ctx.topology.add_child(from);
    let root = ctx.state_machine.root_mac().unwrap_or(ctx.this_mac);
    ctx.send_queue
        .push(SendItem {
            id: new_packet_id(),
            payload: Payload::ConnectOk { root },
            behavior: SendBehavior::direct_once(from),
        })
        .await;
    ctx.send_queue
        .push(SendItem {
            id: new_packet_id(),
            payload: Payload::RoutingTableAdd { entry: from },
            behavior: SendBehavior::upstream_retry(),
        })
        .await;
}

fn on_connect_ok<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address, root: Address)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    if !ctx.connect_job.on_connect_response(from, root) {
        return;
    }
    ctx.topology.set_parent(from);
    let (old, mid) = ctx.state_machine.transition(NodeState::ConnectedToParent, None);
    ctx.event_bus.publish(Event::StateChanged { old, new: mid });
    let (old, new) = ctx.state_machine.transition(NodeState::ReachesRoot, Some(root));
    ctx.event_bus.publish(Event::StateChanged { old, new });
    ctx.event_bus.publish(Event::GotConnectResponse { parent: from, root });
    ctx.event_bus.publish(Event::ParentConnected { parent: from });
}

async fn on_routing_table_add<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address, entry: Address)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    if !ctx.topology.has_child(from) {
        return;
    }
    ctx.topology.add_routing_entry(from, entry);
    if ctx.topology.parent().is_some() {
        ctx.send_queue
            .push(SendItem {
                id: new_packet_id(),
                payload: Payload::RoutingTableAdd { entry },
                behavior: SendBehavior::upstream_retry(),
            })
            .await;
    }
}

async fn on_routing_table_remove<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address, entry: Address)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    if !ctx.topology.has_child(from) {
        return;
    }
    ctx.topology.remove_routing_entry(from, entry);
    if ctx.topology.parent().is_some() {
        ctx.send_queue
            .push(SendItem {
                id: new_packet_id(),
                payload: Payload::RoutingTableRemove { entry },
                behavior: SendBehavior::upstream_retry(),
            })
            .await;
    }
}

async fn on_root_unreachable<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    if ctx.topology.parent().map(|p| p.address) != Some(from) {
        return;
    }
    if ctx.state_machine.state() == NodeState::ReachesRoot {
        let (old, new) = ctx.state_machine.transition(NodeState::ConnectedToParent, None);
        ctx.event_bus.publish(Event::StateChanged { old, new });
        ctx.unreachable_job.arm();
    }
    ctx.send_queue
        .push(SendItem { id: new_packet_id(), payload: Payload::RootUnreachable, behavior: SendBehavior::downstream_retry() })
        .await;
}

async fn on_root_reachable<L, K>(ctx: &mut PacketHandlerCtx<'_, L, K>, from: Address, root: Address)
where
    L: LinkLayer,
    K: KeyValueStore,
{
    if ctx.topology.parent().map(|p| p.address) != Some(from) {
        return;
    }
    if ctx.state_machine.state() == NodeState::ConnectedToParent {
        let (old, new) = ctx.state_machine.transition(NodeState::ReachesRoot, Some(root));
        ctx.event_bus.publish(Event::StateChanged { old, new });
        ctx.unreachable_job.disarm();
    }
    ctx.send_queue
        .push(SendItem {
            id: new_packet_id(),
            payload: Payload::RootReachable { root },
            behavior: SendBehavior::downstream_retry(),
        })
        .await;
}

fn on_data_fragment<L, K>(
    ctx: &mut PacketHandlerCtx<'_, L, K>,
    from: Address,
    frag_id: u32,
    frag_num: u8,
    total_size: u16,
    data: &[u8],
) where
    L: LinkLayer,
    K: KeyValueStore,
{
    if let Some(datagram) = ctx.fragments.add_fragment(from, frag_id, frag_num, total_size, data) {
        ctx.ip_stack.receive(&datagram);
    }
}
