//! Fragment Reassembly & GC (§4.12). Buffers `DataFragment` packets keyed
//! by `(source, fragment_id)`, emitting the reassembled datagram once every
//! expected fragment has arrived, or dropping the entry after
//! `FRAGMENT_TIMEOUT` of inactivity. Grounded on the chunked-transfer
//! reassembly shape used throughout the pack's resource-transfer code
//! (`ResourceReceiver`'s parts-array-plus-timeout pattern), adapted to the
//! fixed small fragment count a 3-bit `frag_num` allows.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use meshnow_wire::{Address, MAX_FRAG_PAYLOAD};

struct Entry {
    total_size: u16,
    parts: Vec<Option<Vec<u8>>>,
    received: usize,
    last_touched: Instant,
}

impl Entry {
    fn new(total_size: u16) -> Self {
        let count = Self::expected_fragments(total_size);
        Self { total_size, parts: vec![None; count], received: 0, last_touched: Instant::now() }
    }

    fn expected_fragments(total_size: u16) -> usize {
        (total_size as usize).div_ceil(MAX_FRAG_PAYLOAD)
    }

    fn is_complete(&self) -> bool {
        self.received == self.parts.len()
    }

    fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_size as usize);
        for part in &self.parts {
            out.extend_from_slice(part.as_deref().unwrap_or(&[]));
        }
        out.truncate(self.total_size as usize);
        out
    }
}

#[derive(Default)]
pub struct FragmentTable {
    entries: HashMap<(Address, u32), Entry>,
}

impl FragmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one `DataFragment` payload in; returns the reassembled
    /// datagram the moment it becomes complete (possibly on the very first
    /// call, per the §4.12 single-fragment short-circuit).
    pub fn add_fragment(&mut self, src: Address, id: u32, num: u8, total_size: u16, data: &[u8]) -> Option<Vec<u8>> {
        if num == 0 && data.len() == total_size as usize {
            return Some(data.to_vec());
        }

        let entry = self
            .entries
            .entry((src, id))
            .or_insert_with(|| Entry::new(total_size));
        entry.last_touched = Instant::now();

        let idx = num as usize;
        if idx >= entry.parts.len() {
            return None;
        }
        if entry.parts[idx].is_none() {
            entry.received += 1;
        }
        entry.parts[idx] = Some(data.to_vec());

        if entry.is_complete() {
            let datagram = entry.assemble();
            self.entries.remove(&(src, id));
            Some(datagram)
        } else {
            None
        }
    }

    /// Drops every entry untouched for longer than `timeout`.
    pub fn sweep(&mut self, timeout: Duration) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now.duration_since(entry.last_touched) < timeout);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            log::debug!("fragment gc: dropped {dropped} incomplete reassembly entries");
        }
    }

    pub fn oldest_last_touched(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.last_touched).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(n: u8) -> Address {
        Address::new([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn single_fragment_short_circuits() {
        let mut table = FragmentTable::new();
        let out = table.add_fragment(a(1), 42, 0, 2, b"hi");
        assert_eq!(out, Some(b"hi".to_vec()));
        assert!(table.is_empty());
    }

    #[test]
    fn out_of_order_reassembly() {
        let mut table = FragmentTable::new();
        let total = (MAX_FRAG_PAYLOAD * 2 + 10) as u16;
        let p0 = vec![b'a'; MAX_FRAG_PAYLOAD];
        let p1 = vec![b'b'; MAX_FRAG_PAYLOAD];
        let p2 = vec![b'c'; 10];

        assert_eq!(table.add_fragment(a(1), 7, 1, total, &p1), None);
        assert_eq!(table.add_fragment(a(1), 7, 0, total, &p0), None);
        let out = table.add_fragment(a(1), 7, 2, total, &p2).unwrap();

        let mut expected = p0.clone();
        expected.extend_from_slice(&p1);
        expected.extend_from_slice(&p2);
        assert_eq!(out, expected);
        assert!(table.is_empty());
    }

    #[test]
    fn distinct_sources_and_ids_do_not_interfere() {
        let mut table = FragmentTable::new();
        let total = (MAX_FRAG_PAYLOAD * 2) as u16;
        table.add_fragment(a(1), 1, 0, total, &vec![0u8; MAX_FRAG_PAYLOAD]);
        table.add_fragment(a(2), 1, 0, total, &vec![1u8; MAX_FRAG_PAYLOAD]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let mut table = FragmentTable::new();
        let total = (MAX_FRAG_PAYLOAD * 2) as u16;
        table.add_fragment(a(1), 1, 0, total, &vec![0u8; MAX_FRAG_PAYLOAD]);
        table.sweep(Duration::from_secs(0));
        assert!(table.is_empty());
    }
}
