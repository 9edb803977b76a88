//! Duplicate-suppression cache (§9 open question, resolved below). Every
//! packet not addressed to this node that reaches the Packet Handler is
//! rebroadcast at least once (§4.13); a node can see the same `(from, id)`
//! pair more than once on a lossy broadcast medium, so forwarding must be
//! suppressed on replay. Grounded on
//! `styrene-rns-transport::transport::packet_cache::PacketCache`'s
//! bounded-map-plus-sweep shape.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use meshnow_wire::Address;

/// Fixed-capacity record of `(from, id)` pairs seen recently. Capacity is
/// enforced by evicting the oldest entry on insert past the limit, rather
/// than by a wall-clock TTL alone, since a node can receive far more than
/// one packet per second from a busy subtree.
pub struct DedupCache {
    capacity: usize,
    seen: HashMap<(Address, u32), Instant>,
    order: Vec<(Address, u32)>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, seen: HashMap::with_capacity(capacity), order: Vec::with_capacity(capacity) }
    }

    /// Records `(from, id)` as seen now and returns whether it had already
    /// been recorded. Call once per inbound packet, before forwarding.
    pub fn check_and_insert(&mut self, from: Address, id: u32) -> bool {
        let key = (from, id);
        if self.seen.contains_key(&key) {
            log::trace!("dedup: dropping replay of {from}/{id}");
            return true;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = if self.order.is_empty() { None } else { Some(self.order.remove(0)) } {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key, Instant::now());
        self.order.push(key);
        false
    }

    /// Drops entries older than `max_age`, per the same periodic-sweep
    /// pattern `PacketCache::release` uses to bound memory independent of
    /// the fixed-capacity eviction above.
    pub fn sweep(&mut self, max_age: Duration) {
        let now = Instant::now();
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) < max_age);
        self.order.retain(|key| self.seen.contains_key(key));
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(n: u8) -> Address {
        Address::new([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn first_sighting_is_not_a_duplicate() {
        let mut cache = DedupCache::new(8);
        assert!(!cache.check_and_insert(a(1), 1));
        assert!(cache.check_and_insert(a(1), 1));
    }

    #[test]
    fn distinct_ids_and_senders_are_independent() {
        let mut cache = DedupCache::new(8);
        assert!(!cache.check_and_insert(a(1), 1));
        assert!(!cache.check_and_insert(a(2), 1));
        assert!(!cache.check_and_insert(a(1), 2));
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let mut cache = DedupCache::new(2);
        cache.check_and_insert(a(1), 1);
        cache.check_and_insert(a(1), 2);
        cache.check_and_insert(a(1), 3);
        assert_eq!(cache.len(), 2);
        assert!(!cache.check_and_insert(a(1), 1));
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let mut cache = DedupCache::new(8);
        cache.check_and_insert(a(1), 1);
        cache.sweep(Duration::from_secs(0));
        assert!(cache.is_empty());
    }
}
