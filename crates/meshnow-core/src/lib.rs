//! # meshnow-core
//!
//! Control and routing plane for the MeshNOW self-organizing tree mesh
//! overlay: a spanning tree built over a short-range, lossy,
//! broadcast-capable radio link layer with ~250-byte datagrams. One root
//! node anchors the tree; every other node picks a parent by RSSI-ranked
//! broadcast search and forwards packets up or down the tree toward their
//! destination.
//!
//! This crate owns the Topology Store, State Machine, Send/Receive Queues,
//! Fragment Reassembly table, duplicate-suppression cache, and the
//! background Jobs that drive the handshake, keep-alive, and root-liveness
//! protocols. The link layer, the virtual IP-stack adaptor, and persistent
//! key-value storage are all external collaborators, specified here only as
//! traits ([`LinkLayer`], [`IpStackAdapter`], [`KeyValueStore`]) — concrete
//! driver implementations live outside this crate.
//!
//! [`Mesh`] is the entry point: `init` wires a node's collaborators
//! together, `start`/`stop` spin the Job Runner and Send Worker tasks up and
//! down, and `send`/`transmit_ip_datagram` enqueue outbound traffic.

mod callbacks;
mod collaborators;
mod config;
mod dedup;
mod error;
mod event;
mod fragment;
mod jobs;
mod packet_handler;
mod queue;
mod runtime;
mod send;
mod state;
mod topology;

pub use callbacks::{CallbackHandle, DataCallback};
pub use collaborators::{IpStackAdapter, KeyValueStore, LinkError, LinkLayer, SendOutcome};
pub use config::MeshConfig;
pub use error::MeshError;
pub use event::{Event, EventBus};
pub use meshnow_wire::{Address, NodeState};
pub use runtime::Mesh;
