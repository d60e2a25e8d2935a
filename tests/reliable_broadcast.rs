use std::collections::{BTreeMap, BTreeSet};

use brb_causal::{Behavior, BroadcastId, Config, NodeId, RelayOptions};
use brb_net::{circulant, fully_connected, Net};
use eyre::Result;
use quickcheck_macros::quickcheck;
use rand::{rngs::StdRng, SeedableRng};


static INIT: std::sync::Once = std::sync::Once::new();

fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

fn honest_ids(net: &Net) -> Vec<NodeId> {
    net.honest().map(|node| node.id()).collect()
}

// Payload delivered for every broadcast, by every correct node.
fn honest_deliveries(net: &Net) -> BTreeMap<BroadcastId, BTreeMap<NodeId, Vec<u8>>> {
    let mut by_id: BTreeMap<BroadcastId, BTreeMap<NodeId, Vec<u8>>> = BTreeMap::new();
    for node in honest_ids(net) {
        for delivery in net.deliveries(node) {
            by_id
                .entry(delivery.id)
                .or_default()
                .insert(node, delivery.payload.clone());
        }
    }
    by_id
}

fn assert_agreement(net: &Net) {
    for (id, payloads) in honest_deliveries(net) {
        let distinct = BTreeSet::from_iter(payloads.values());
        assert_eq!(distinct.len(), 1, "correct nodes disagree on {}", id);
    }
}

fn assert_integrity(net: &Net) {
    for node in 0..net.nodes.len() {
        let ids = Vec::from_iter(net.deliveries(node).iter().map(|d| d.id));
        let distinct = BTreeSet::from_iter(ids.iter());
        assert_eq!(ids.len(), distinct.len(), "node {} delivered twice", node);
    }
}

fn assert_validity(net: &Net, id: BroadcastId, payload: &[u8]) {
    for node in honest_ids(net) {
        let delivery = net.delivery_of(node, id);
        assert_eq!(
            delivery.map(|d| d.payload.as_slice()),
            Some(payload),
            "node {} missed {}",
            node,
            id
        );
    }
}

#[test]
fn test_four_nodes_deliver_hello_once() -> Result<()> {
    init();
    let config = Config::new(4, [3]).with_behavior(3, Behavior::None);
    let mut net = Net::new(config, &fully_connected(4))?;

    let id = net.broadcast(0, b"hello")?;
    net.drain();

    for node in 0..4 {
        assert_eq!(net.payloads(node), vec![&b"hello"[..]]);
        assert!(net.nodes[node].is_delivered(&id));
    }
    Ok(())
}

#[test]
fn test_partial_graph_with_tamperer() -> Result<()> {
    init();
    let config = Config::new(7, [3])
        .with_broadcaster(0, 1)
        .with_broadcaster(5, 2);
    let mut net = Net::new(config, &circulant(7, &[1, 2]))?;
    assert_eq!(net.nodes[3].behavior(), Behavior::TamperInFlight);

    net.start()?;
    net.drain();

    let from_0 = BroadcastId { author: 0, seq: 1 };
    let from_5 = BroadcastId { author: 5, seq: 2 };
    assert_validity(&net, from_0, b"node-0-msg-0");
    assert_validity(&net, from_5, b"node-5-msg-1");
    assert_agreement(&net);
    assert_integrity(&net);

    // The tamperer only trusts itself.
    assert_eq!(net.payloads(3), Vec::<&[u8]>::new());
    Ok(())
}

#[test]
fn test_fabricating_broadcaster_can_not_split_correct_nodes() -> Result<()> {
    init();
    let config = Config::new(4, [3])
        .with_broadcaster(3, 1)
        .with_broadcaster(0, 1);
    let mut net = Net::new(config, &fully_connected(4))?;
    assert_eq!(net.nodes[3].behavior(), Behavior::FabricateBroadcast);

    net.start()?;
    net.drain();

    assert_validity(&net, BroadcastId { author: 0, seq: 1 }, b"node-0-msg-0");
    assert_agreement(&net);
    assert_integrity(&net);
    Ok(())
}

#[test]
fn test_ten_nodes_three_tamperers() -> Result<()> {
    init();
    let config = Config::new(10, [7, 8, 9])
        .with_broadcaster(0, 1)
        .with_broadcaster(4, 1);
    let mut net = Net::new(config, &fully_connected(10))?;

    net.start()?;
    net.drain();

    assert_validity(&net, BroadcastId { author: 0, seq: 1 }, b"node-0-msg-0");
    assert_validity(&net, BroadcastId { author: 4, seq: 1 }, b"node-4-msg-0");
    assert_agreement(&net);
    Ok(())
}

#[test]
fn test_unoptimized_relay_delivers_too() -> Result<()> {
    init();
    let config = Config::new(4, [3]).with_relay(RelayOptions::unoptimized());
    let mut net = Net::new(config, &fully_connected(4))?;

    let id = net.broadcast(1, b"flooded")?;
    net.drain();

    assert_validity(&net, id, b"flooded");
    assert_integrity(&net);
    Ok(())
}

#[test]
fn test_delivery_reports() -> Result<()> {
    init();
    let mut net = Net::new(Config::new(4, [3]), &fully_connected(4))?;

    let id = net.broadcast(0, b"measured")?;
    net.drain();

    let reports = Vec::from_iter(net.reports.iter().filter(|r| r.id == id));
    let reporters = BTreeSet::from_iter(reports.iter().map(|r| r.node));
    assert_eq!(reporters, BTreeSet::from_iter([0, 1, 2]));
    assert_eq!(reports.len(), 3);

    for report in reports {
        assert!(report.ended >= report.started);
        assert!(report.bytes_relayed > 0);
        if report.node != 0 {
            assert!(report.relay_messages > 0);
        }
    }
    Ok(())
}

#[quickcheck]
fn prop_any_delivery_order_is_safe_and_live(seed: u64) -> bool {
    init();
    let config = Config::new(4, [3])
        .with_broadcaster(0, 1)
        .with_broadcaster(1, 1)
        .with_broadcaster(3, 1)
        .with_seed(seed);
    let mut net = match Net::new(config, &fully_connected(4)) {
        Ok(net) => net,
        Err(_) => return false,
    };
    if net.start().is_err() {
        return false;
    }
    net.drain_randomly(&mut StdRng::seed_from_u64(seed));

    assert_validity(&net, BroadcastId { author: 0, seq: 1 }, b"node-0-msg-0");
    assert_validity(&net, BroadcastId { author: 1, seq: 1 }, b"node-1-msg-0");
    assert_agreement(&net);
    assert_integrity(&net);
    true
}
