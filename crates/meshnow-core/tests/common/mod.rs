//! Shared test fabric: a simulated radio medium wiring several `Mesh`
//! instances together, plus minimal `IpStackAdapter`/`KeyValueStore` mocks.
//! Mirrors the hand-rolled mock-adapter pattern used by
//! `embedded_link_contract.rs` in the teacher's own `tests/` suite, scaled
//! up to a multi-node fabric since these are whole-mesh scenario tests.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use meshnow_core::{Address, IpStackAdapter, KeyValueStore, LinkError, LinkLayer, MeshConfig, SendOutcome};

/// A shared broadcast-capable medium. Each node gets its own [`FabricLink`],
/// registered here by address so other nodes' sends can find it.
pub struct Fabric {
    links: Mutex<HashMap<Address, Arc<FabricLink>>>,
}

impl Fabric {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { links: Mutex::new(HashMap::new()) })
    }

    pub fn create_link(self: &Arc<Self>, addr: Address) -> Arc<FabricLink> {
        let link = Arc::new(FabricLink {
            this_mac: addr,
            fabric: self.clone(),
            recv_cb: Mutex::new(None),
            complete_cb: Mutex::new(None),
            channel: Mutex::new(0),
        });
        self.links.lock().unwrap().insert(addr, link.clone());
        link
    }
}

pub struct FabricLink {
    this_mac: Address,
    fabric: Arc<Fabric>,
    recv_cb: Mutex<Option<Box<dyn Fn(Address, &[u8], i8) + Send + Sync>>>,
    complete_cb: Mutex<Option<Box<dyn Fn(SendOutcome) + Send + Sync>>>,
    pub channel: Mutex<u8>,
}

impl FabricLink {
    /// Directly injects a frame as if it had just arrived over the air,
    /// bypassing any other node's send path. Used to simulate a duplicate
    /// delivery of the same broadcast that a lossy radio medium can produce
    /// on its own (e.g. two neighbors independently relaying it).
    pub fn deliver(&self, from: Address, bytes: &[u8], rssi: i8) {
        if let Some(cb) = self.recv_cb.lock().unwrap().as_ref() {
            cb(from, bytes, rssi);
        }
    }
}

impl LinkLayer for FabricLink {
    fn register_recv(&self, callback: Box<dyn Fn(Address, &[u8], i8) + Send + Sync>) {
        *self.recv_cb.lock().unwrap() = Some(callback);
    }

    fn register_send_complete(&self, callback: Box<dyn Fn(SendOutcome) + Send + Sync>) {
        *self.complete_cb.lock().unwrap() = Some(callback);
    }

    fn send(&self, peer: Address, bytes: &[u8]) -> Result<(), LinkError> {
        let links = self.fabric.links.lock().unwrap();
        let ok = if peer.is_broadcast() {
            for (addr, link) in links.iter() {
                if *addr == self.this_mac {
                    continue;
                }
                link.deliver(self.this_mac, bytes, -40);
            }
            true
        } else if let Some(link) = links.get(&peer) {
            link.deliver(self.this_mac, bytes, -40);
            true
        } else {
            false
        };
        drop(links);
        if let Some(cb) = self.complete_cb.lock().unwrap().as_ref() {
            cb(SendOutcome { peer, ok });
        }
        Ok(())
    }

    fn set_channel(&self, channel: u8) {
        *self.channel.lock().unwrap() = channel;
    }
}

#[derive(Default)]
pub struct RecordingIpStack {
    pub received: Mutex<Vec<Vec<u8>>>,
}

impl IpStackAdapter for RecordingIpStack {
    fn receive(&self, datagram: &[u8]) {
        self.received.lock().unwrap().push(datagram.to_vec());
    }
}

#[derive(Default)]
pub struct InMemoryKv {
    last_channel: Mutex<Option<u8>>,
}

impl KeyValueStore for InMemoryKv {
    fn get_u8(&self, key: &str) -> Option<u8> {
        if key == "last_channel" {
            *self.last_channel.lock().unwrap()
        } else {
            None
        }
    }

    fn set_u8(&self, key: &str, value: u8) {
        if key == "last_channel" {
            *self.last_channel.lock().unwrap() = Some(value);
        }
    }

    fn commit(&self) {}
}

/// Counts how many times a data callback has fired and the last payload
/// seen, for scenario assertions that only care "did it arrive, once".
#[derive(Default, Clone)]
pub struct DeliveryCounter {
    inner: Arc<(std::sync::atomic::AtomicUsize, Mutex<Vec<Vec<u8>>>)>,
}

impl DeliveryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> Box<dyn Fn(Address, &[u8]) + Send + Sync> {
        let inner = self.inner.clone();
        Box::new(move |_src, data| {
            inner.0.fetch_add(1, Ordering::SeqCst);
            inner.1.lock().unwrap().push(data.to_vec());
        })
    }

    pub fn count(&self) -> usize {
        self.inner.0.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.inner.1.lock().unwrap().clone()
    }
}

/// Tunables fast enough for tests to converge in well under a second while
/// still exercising every timing-driven job.
pub fn fast_config(is_root: bool) -> MeshConfig {
    let mut config = MeshConfig::new(is_root);
    config.set_search_probe_interval(Duration::from_millis(5));
    config.set_first_parent_wait(Duration::from_millis(20));
    config.set_connect_timeout(Duration::from_millis(50));
    config.set_status_send_interval(Duration::from_millis(20));
    config.set_keep_alive_timeout(Duration::from_millis(80));
    config.set_root_unreachable_timeout(Duration::from_millis(60));
    config.set_fragment_timeout(Duration::from_millis(100));
    config
}

pub fn addr(n: u8) -> Address {
    Address::new([0, 0, 0, 0, 0, n])
}

/// Polls `predicate` until it returns true or `timeout` elapses, yielding
/// between checks so the job runner and send worker tasks make progress.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, predicate: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
