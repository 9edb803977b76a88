//! Topology Store (§4.2): the process-wide record of this node's parent,
//! direct children, and each child's transitive routing table. Grounded on
//! `styrene-rns-transport::transport::path_table::PathTable` — a single
//! struct behind the crate's global lock, queried for next-hop resolution.

use std::time::Instant;

use meshnow_wire::Address;

/// A neighbor this node has a live connection to, directly or as a child.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor {
    pub address: Address,
    pub last_seen: Instant,
}

impl Neighbor {
    pub fn new(address: Address) -> Self {
        Self { address, last_seen: Instant::now() }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }
}

/// A direct child plus the addresses reachable through its subtree, in
/// discovery order.
#[derive(Debug, Clone)]
pub struct Child {
    pub neighbor: Neighbor,
    pub routing_table: Vec<Address>,
}

impl Child {
    fn new(address: Address) -> Self {
        Self { neighbor: Neighbor::new(address), routing_table: Vec::new() }
    }

    pub fn address(&self) -> Address {
        self.neighbor.address
    }
}

/// The spanning-tree neighborhood of one node (§3's "Topology store").
pub struct Topology {
    parent: Option<Neighbor>,
    children: Vec<Child>,
    max_children: usize,
}

impl Topology {
    pub fn new(max_children: usize) -> Self {
        Self { parent: None, children: Vec::new(), max_children }
    }

    pub fn parent(&self) -> Option<&Neighbor> {
        self.parent.as_ref()
    }

    pub fn parent_mut(&mut self) -> Option<&mut Neighbor> {
        self.parent.as_mut()
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_none() && self.children.is_empty()
    }

    pub fn set_parent(&mut self, addr: Address) {
        self.parent = Some(Neighbor::new(addr));
    }

    pub fn remove_parent(&mut self) {
        self.parent = None;
    }

    pub fn has_capacity(&self) -> bool {
        self.children.len() < self.max_children
    }

    /// No-op if `addr` is already a child or there is no remaining
    /// capacity. O(children).
    pub fn add_child(&mut self, addr: Address) {
        if self.children.iter().any(|c| c.address() == addr) {
            return;
        }
        if self.children.len() >= self.max_children {
            return;
        }
        debug_assert!(self.parent.map(|p| p.address) != Some(addr), "addr is both parent and child");
        self.children.push(Child::new(addr));
    }

    /// Drops the child entry and its whole routing table.
    pub fn remove_child(&mut self, addr: Address) {
        self.children.retain(|c| c.address() != addr);
    }

    pub fn has_child(&self, addr: Address) -> bool {
        self.children.iter().any(|c| c.address() == addr)
    }

    pub fn child_mut(&mut self, addr: Address) -> Option<&mut Child> {
        self.children.iter_mut().find(|c| c.address() == addr)
    }

    /// Appends to `direct_child`'s routing table if not already present.
    /// No-op if `direct_child` is not a known child.
    pub fn add_routing_entry(&mut self, direct_child: Address, remote: Address) {
        if let Some(child) = self.child_mut(direct_child) {
            if !child.routing_table.contains(&remote) {
                child.routing_table.push(remote);
            }
        }
    }

    pub fn remove_routing_entry(&mut self, direct_child: Address, remote: Address) {
        if let Some(child) = self.child_mut(direct_child) {
            child.routing_table.retain(|&a| a != remote);
        }
    }

    /// True iff `addr` is the parent, a direct child, or in any child's
    /// routing table.
    pub fn has(&self, addr: Address) -> bool {
        if self.parent.map(|p| p.address) == Some(addr) {
            return true;
        }
        self.children
            .iter()
            .any(|c| c.address() == addr || c.routing_table.contains(&addr))
    }

    /// Next-hop resolution (§4.2). `this_mac` and `is_root` describe the
    /// local node, since the topology store itself has no notion of its own
    /// identity or role.
    pub fn resolve(&self, dest: Address, this_mac: Address, is_root: bool) -> Option<Address> {
        if dest == this_mac || dest.is_broadcast() {
            return Some(dest);
        }
        if dest.is_root_sentinel() {
            return if is_root { Some(this_mac) } else { self.parent.map(|p| p.address) };
        }
        if self.parent.map(|p| p.address) == Some(dest) {
            return self.parent.map(|p| p.address);
        }
        for child in &self.children {
            if child.address() == dest || child.routing_table.contains(&dest) {
                return Some(child.address());
            }
        }
        self.parent.map(|p| p.address)
    }

    /// Bumps `last_seen` for the parent or a direct child. No-op for any
    /// other address (transitive routing-table entries are not neighbors).
    pub fn touch(&mut self, addr: Address) {
        if let Some(parent) = self.parent.as_mut() {
            if parent.address == addr {
                parent.touch();
                return;
            }
        }
        if let Some(child) = self.child_mut(addr) {
            child.neighbor.touch();
        }
    }

    /// Every address currently considered a live neighbor (parent + direct
    /// children), for the keep-alive sweep and `NeighborsOnce` broadcast.
    pub fn neighbors(&self) -> impl Iterator<Item = Address> + '_ {
        self.parent.iter().map(|p| p.address).chain(self.children.iter().map(|c| c.address()))
    }
}
