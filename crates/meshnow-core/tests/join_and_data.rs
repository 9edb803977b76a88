//! Scenario A (basic join) and the `send`/data-callback round trip it
//! unlocks: a lone child finds the root via broadcast search, completes the
//! connect handshake, and can then exchange custom data with it.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{addr, fast_config, wait_until, DeliveryCounter, Fabric, InMemoryKv, RecordingIpStack};
use meshnow_core::{Event, Mesh};

#[tokio::test]
async fn child_joins_root_and_exchanges_data() {
    let fabric = Fabric::new();
    let root_addr = addr(1);
    let child_addr = addr(2);

    let root = Mesh::init(
        fast_config(true),
        root_addr,
        fabric.create_link(root_addr),
        Arc::new(RecordingIpStack::default()),
        Arc::new(InMemoryKv::default()),
    );
    let child = Mesh::init(
        fast_config(false),
        child_addr,
        fabric.create_link(child_addr),
        Arc::new(RecordingIpStack::default()),
        Arc::new(InMemoryKv::default()),
    );

    let mut child_events = child.subscribe_events();

    root.start().await.unwrap();
    child.start().await.unwrap();

    let joined = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match child_events.recv().await {
                Ok(Event::ParentConnected { parent }) => return parent,
                Ok(_) => continue,
                Err(_) => panic!("event bus closed before join"),
            }
        }
    })
    .await
    .expect("child did not connect to root in time");
    assert_eq!(joined, root_addr);

    let root_rx = DeliveryCounter::new();
    root.register_data_callback(root_rx.callback());
    child.send(root_addr, b"hello root").await.unwrap();

    assert!(wait_until(Duration::from_millis(500), || root_rx.count() == 1).await);
    assert_eq!(root_rx.payloads(), vec![b"hello root".to_vec()]);

    root.stop().await.unwrap();
    child.stop().await.unwrap();
}
