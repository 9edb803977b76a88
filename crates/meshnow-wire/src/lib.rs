//! # meshnow-wire
//!
//! Wire protocol envelope for the MeshNOW tree mesh overlay.
//!
//! This crate implements the bit-exact binary frame format carried over the
//! link layer: a fixed header (magic, random packet id, source, destination)
//! followed by one of eleven payload variants, including a bit-packed
//! fragment header for the reassembly engine. It has no I/O and no async —
//! callers hand it bytes in, get `Packet`s out, and vice versa.
//!
//! ## Wire format
//!
//! ```text
//! [magic:3][id:4][from:6][to:6][tag:1][payload body: variable]
//!  55 77 55  u32le  addr   addr   u8
//! ```
//!
//! All multi-byte integers are little-endian.

mod address;
mod wire;

pub use address::Address;
pub use wire::{NodeState, Packet, Payload, WireError, FIXED_HEADER, MAX_CUSTOM_PAYLOAD, MAX_FRAG_PAYLOAD, MAX_LINK_DATAGRAM};
