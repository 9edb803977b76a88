//! Scenario D (fragmentation): a datagram larger than one link frame is
//! split into `DataFragment`s by `transmit_ip_datagram`, and the receiver
//! must reassemble it correctly even when the fragments arrive out of
//! order, as a lossy broadcast medium can deliver them.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{addr, fast_config, wait_until, Fabric, InMemoryKv, RecordingIpStack};
use meshnow_core::Mesh;
use meshnow_wire::{Packet, Payload};

#[tokio::test]
async fn large_datagram_reassembles_despite_out_of_order_fragments() {
    let fabric = Fabric::new();
    let sender_addr = addr(1);
    let receiver_addr = addr(2);

    let receiver_ip = Arc::new(RecordingIpStack::default());
    let receiver_link = fabric.create_link(receiver_addr);
    let receiver = Mesh::init(
        fast_config(true),
        receiver_addr,
        receiver_link.clone(),
        receiver_ip.clone(),
        Arc::new(InMemoryKv::default()),
    );
    receiver.start().await.unwrap();

    // Registers this address with the fabric so the injected fragments
    // carry a sender address the receiver could plausibly route replies
    // to, without spinning up a full `Mesh` for the sender side.
    let _sender_link = fabric.create_link(sender_addr);

    let frag_payload_len = meshnow_wire::MAX_FRAG_PAYLOAD;
    let total_size = frag_payload_len * 2 + 37;
    let datagram: Vec<u8> = (0..total_size).map(|i| (i % 251) as u8).collect();

    let frag_id = 0xcafe_u32;
    let chunks: Vec<&[u8]> = datagram.chunks(frag_payload_len).collect();
    assert_eq!(chunks.len(), 3);

    let frames: Vec<Vec<u8>> = chunks
        .iter()
        .enumerate()
        .map(|(num, chunk)| {
            Packet::new(
                frag_id,
                sender_addr,
                receiver_addr,
                Payload::DataFragment {
                    frag_id,
                    frag_num: num as u8,
                    total_size: total_size as u16,
                    data: chunk.to_vec(),
                },
            )
            .encode()
        })
        .collect();

    // Deliver the last fragment first, then the first, then the middle.
    for &order in &[2usize, 0, 1] {
        receiver_link.deliver(sender_addr, &frames[order], -40);
    }

    assert!(wait_until(Duration::from_millis(500), || !receiver_ip.received.lock().unwrap().is_empty()).await);
    let delivered = receiver_ip.received.lock().unwrap().clone();
    assert_eq!(delivered, vec![datagram]);

    receiver.stop().await.unwrap();
}
