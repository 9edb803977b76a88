use std::fmt;

/// A 6-byte link-layer hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// All-ones address: matches every node on the link layer.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// All-zeros address: "whoever the current root is", resolved per hop.
    pub const ROOT_SENTINEL: Address = Address([0x00; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub const fn is_broadcast(&self) -> bool {
        self.0[0] == 0xff
            && self.0[1] == 0xff
            && self.0[2] == 0xff
            && self.0[3] == 0xff
            && self.0[4] == 0xff
            && self.0[5] == 0xff
    }

    pub const fn is_root_sentinel(&self) -> bool {
        self.0[0] == 0
            && self.0[1] == 0
            && self.0[2] == 0
            && self.0[3] == 0
            && self.0[4] == 0
            && self.0[5] == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_sentinel_are_distinct() {
        assert_ne!(Address::BROADCAST, Address::ROOT_SENTINEL);
        assert!(Address::BROADCAST.is_broadcast());
        assert!(Address::ROOT_SENTINEL.is_root_sentinel());
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Address::from_slice(&[1, 2, 3]).is_none());
        assert!(Address::from_slice(&[1, 2, 3, 4, 5, 6, 7]).is_none());
        assert!(Address::from_slice(&[1, 2, 3, 4, 5, 6]).is_some());
    }

    #[test]
    fn display_is_colon_hex() {
        let addr = Address::new([0, 0x0a, 0xff, 1, 2, 3]);
        assert_eq!(addr.to_string(), "00:0a:ff:01:02:03");
    }
}
