use crate::address::Address;

/// Magic bytes every frame begins with. Frames failing this check are
/// dropped silently before they ever reach the job runner.
pub const MAGIC: [u8; 3] = [0x55, 0x77, 0x55];

/// Largest datagram the link layer will carry in one send.
pub const MAX_LINK_DATAGRAM: usize = 250;

/// magic(3) + id(4) + from(6) + to(6) + tag(1).
pub const FIXED_HEADER: usize = 20;

/// Largest payload a single `DataFragment` body can carry.
pub const MAX_FRAG_PAYLOAD: usize = MAX_LINK_DATAGRAM - FIXED_HEADER - 4 - 2;

/// Largest payload a single `CustomData` body can carry.
pub const MAX_CUSTOM_PAYLOAD: usize = MAX_LINK_DATAGRAM - FIXED_HEADER;

/// Largest `total_size` representable in the fragment header's 11-bit field.
const MAX_FRAG_TOTAL_SIZE: u16 = (1 << 11) - 1;

/// Largest `frag_num` representable in the fragment header's 3-bit field.
const MAX_FRAG_NUM: u8 = (1 << 3) - 1;

/// Errors returned while decoding a frame. Every variant corresponds to one
/// of the rejection rules in the wire format's invalid-frame policy.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("bad magic bytes")]
    BadMagic,
    #[error("unknown payload tag: {0}")]
    UnknownTag(u8),
    #[error("payload body malformed for its tag")]
    MalformedBody,
    #[error("fragment options out of range")]
    InvalidFragmentOptions,
}

/// Node lifecycle state, as carried in a `Status` payload. Mirrors
/// `meshnow_core::state::NodeState` one-to-one; kept here because it is
/// part of the wire contract, not an implementation detail of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    DisconnectedFromParent = 0,
    ConnectedToParent = 1,
    ReachesRoot = 2,
}

impl NodeState {
    fn from_byte(b: u8) -> Result<Self, WireError> {
        match b {
            0 => Ok(Self::DisconnectedFromParent),
            1 => Ok(Self::ConnectedToParent),
            2 => Ok(Self::ReachesRoot),
            _ => Err(WireError::MalformedBody),
        }
    }
}

/// One payload variant per wire tag (§4.1 of the design).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Status { state: NodeState, root: Option<Address> },
    SearchProbe,
    SearchReply,
    ConnectRequest,
    ConnectOk { root: Address },
    RoutingTableAdd { entry: Address },
    RoutingTableRemove { entry: Address },
    RootUnreachable,
    RootReachable { root: Address },
    DataFragment { frag_id: u32, frag_num: u8, total_size: u16, data: Vec<u8> },
    CustomData { data: Vec<u8> },
}

impl Payload {
    fn tag(&self) -> u8 {
        match self {
            Payload::Status { .. } => 0,
            Payload::SearchProbe => 1,
            Payload::SearchReply => 2,
            Payload::ConnectRequest => 3,
            Payload::ConnectOk { .. } => 4,
            Payload::RoutingTableAdd { .. } => 5,
            Payload::RoutingTableRemove { .. } => 6,
            Payload::RootUnreachable => 7,
            Payload::RootReachable { .. } => 8,
            Payload::DataFragment { .. } => 9,
            Payload::CustomData { .. } => 10,
        }
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        match self {
            Payload::Status { state, root } => {
                out.push(*state as u8);
                if let Some(root) = root {
                    out.extend_from_slice(root.as_bytes());
                }
            }
            Payload::SearchProbe
            | Payload::SearchReply
            | Payload::ConnectRequest
            | Payload::RootUnreachable => {}
            Payload::ConnectOk { root } | Payload::RootReachable { root } => {
                out.extend_from_slice(root.as_bytes());
            }
            Payload::RoutingTableAdd { entry } | Payload::RoutingTableRemove { entry } => {
                out.extend_from_slice(entry.as_bytes());
            }
            Payload::DataFragment { frag_id, frag_num, total_size, data } => {
                out.extend_from_slice(&frag_id.to_le_bytes());
                let options: u16 = (*frag_num as u16 & 0x7) | ((*total_size & 0x7ff) << 3);
                out.extend_from_slice(&options.to_le_bytes());
                out.extend_from_slice(data);
            }
            Payload::CustomData { data } => {
                out.extend_from_slice(data);
            }
        }
    }

    fn decode_body(tag: u8, body: &[u8]) -> Result<Self, WireError> {
        match tag {
            0 => {
                if body.is_empty() {
                    return Err(WireError::MalformedBody);
                }
                let state = NodeState::from_byte(body[0])?;
                match state {
                    NodeState::ReachesRoot => {
                        if body.len() != 1 + 6 {
                            return Err(WireError::MalformedBody);
                        }
                        let root = Address::from_slice(&body[1..7]).ok_or(WireError::MalformedBody)?;
                        Ok(Payload::Status { state, root: Some(root) })
                    }
                    _ => {
                        if body.len() != 1 {
                            return Err(WireError::MalformedBody);
                        }
                        Ok(Payload::Status { state, root: None })
                    }
                }
            }
            1 => empty(body, Payload::SearchProbe),
            2 => empty(body, Payload::SearchReply),
            3 => empty(body, Payload::ConnectRequest),
            4 => addr_body(body).map(|root| Payload::ConnectOk { root }),
            5 => addr_body(body).map(|entry| Payload::RoutingTableAdd { entry }),
            6 => addr_body(body).map(|entry| Payload::RoutingTableRemove { entry }),
            7 => empty(body, Payload::RootUnreachable),
            8 => addr_body(body).map(|root| Payload::RootReachable { root }),
            9 => {
                if body.len() < 6 {
                    return Err(WireError::MalformedBody);
                }
                let frag_id = u32::from_le_bytes(body[0..4].try_into().unwrap());
                let options = u16::from_le_bytes(body[4..6].try_into().unwrap());
                let frag_num = (options & 0x7) as u8;
                let total_size = (options >> 3) & 0x7ff;
                if total_size > MAX_FRAG_TOTAL_SIZE || frag_num > MAX_FRAG_NUM {
                    return Err(WireError::InvalidFragmentOptions);
                }
                if frag_num as usize * MAX_FRAG_PAYLOAD >= total_size as usize {
                    return Err(WireError::InvalidFragmentOptions);
                }
                let expected_len =
                    (total_size as usize - frag_num as usize * MAX_FRAG_PAYLOAD).min(MAX_FRAG_PAYLOAD);
                let data = &body[6..];
                if data.len() != expected_len {
                    return Err(WireError::InvalidFragmentOptions);
                }
                Ok(Payload::DataFragment { frag_id, frag_num, total_size, data: data.to_vec() })
            }
            10 => {
                if body.len() > MAX_CUSTOM_PAYLOAD {
                    return Err(WireError::MalformedBody);
                }
                Ok(Payload::CustomData { data: body.to_vec() })
            }
            other => Err(WireError::UnknownTag(other)),
        }
    }
}

fn empty(body: &[u8], payload: Payload) -> Result<Payload, WireError> {
    if body.is_empty() {
        Ok(payload)
    } else {
        Err(WireError::MalformedBody)
    }
}

fn addr_body(body: &[u8]) -> Result<Address, WireError> {
    if body.len() != 6 {
        return Err(WireError::MalformedBody);
    }
    Address::from_slice(body).ok_or(WireError::MalformedBody)
}

/// A fully-addressed frame: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u32,
    pub from: Address,
    pub to: Address,
    pub payload: Payload,
}

impl Packet {
    pub fn new(id: u32, from: Address, to: Address, payload: Payload) -> Self {
        Self { id, from, to, payload }
    }

    /// Encode to wire format bytes. Deterministic for a given `Packet`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_HEADER + 16);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(self.from.as_bytes());
        out.extend_from_slice(self.to.as_bytes());
        out.push(self.payload.tag());
        self.payload.encode_body(&mut out);
        out
    }

    /// Decode from wire format bytes.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < FIXED_HEADER {
            return Err(WireError::TooShort(data.len()));
        }
        if data[0..3] != MAGIC {
            return Err(WireError::BadMagic);
        }
        let id = u32::from_le_bytes(data[3..7].try_into().unwrap());
        let from = Address::from_slice(&data[7..13]).unwrap();
        let to = Address::from_slice(&data[13..19]).unwrap();
        let tag = data[19];
        let payload = Payload::decode_body(tag, &data[20..])?;
        Ok(Packet { id, from, to, payload })
    }
}
