//! External collaborator traits (§6). The link-layer driver, the IP-stack
//! adaptor, and the persistent key-value store are all out of scope for this
//! crate (§1); only their interfaces are specified here, grounded on the
//! shape of `styrene-rns-transport::embedded_link::EmbeddedLinkAdapter`.

use meshnow_wire::Address;

/// Outcome of one `LinkLayer::send` call, delivered exactly once per send
/// (§6: "the link layer reports send completion exactly once per `send`
/// call, success or failure").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub peer: Address,
    pub ok: bool,
}

/// Errors a `LinkLayer` implementation can report from `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    NotReady,
    QueueFull,
    FrameTooLarge,
    Io,
}

/// The short, connectionless broadcast-capable radio datagram service this
/// crate routes over. Out of scope (§1) — the driver itself lives outside
/// this crate; this trait is the seam.
pub trait LinkLayer: Send + Sync {
    /// Registers the callback invoked for every inbound frame:
    /// `(sender_addr, buffer, rssi)`.
    fn register_recv(&self, callback: Box<dyn Fn(Address, &[u8], i8) + Send + Sync>);

    /// Registers the callback invoked once per `send` call with its outcome.
    fn register_send_complete(&self, callback: Box<dyn Fn(SendOutcome) + Send + Sync>);

    /// Sends one frame (already serialized by the Packet Codec) to `peer`.
    /// `peer` may be `Address::BROADCAST`.
    fn send(&self, peer: Address, bytes: &[u8]) -> Result<(), LinkError>;

    /// Some link layers require peer registration before `send` succeeds;
    /// others are connectionless and can no-op these.
    fn add_peer(&self, _peer: Address) {}
    fn del_peer(&self, _peer: Address) {}

    /// Switches the radio to `channel` for the Connect Job's search scan.
    /// Wi-Fi radio configuration itself is out of scope (§1); this is only
    /// the seam the handshake drives channel hops through.
    fn set_channel(&self, _channel: u8) {}
}

/// The virtual network interface adaptor. `receive` pushes a reassembled
/// datagram up to the IP stack; `transmit` (called the other direction, by
/// the stack into this crate) is exposed as `Mesh::transmit_ip_datagram`.
pub trait IpStackAdapter: Send + Sync {
    fn receive(&self, datagram: &[u8]);
}

/// Persistent key-value storage, used only by the handshake to resume on
/// the last-known channel across restarts.
pub trait KeyValueStore: Send + Sync {
    fn get_u8(&self, key: &str) -> Option<u8>;
    fn set_u8(&self, key: &str, value: u8);
    fn commit(&self);
}
