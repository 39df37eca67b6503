//! Peer overlay integration tests: join flow, peer list propagation,
//! liveness probing, and eviction.

use std::time::Duration;

use drift_core::PeerId;
use drift_net::{PeerRecord, PeerRegistry};
use drift_tests::{init_tracing, TestNetwork, TestNode};

#[tokio::test]
async fn test_join_registers_both_sides() {
    init_tracing();

    let network = TestNetwork::with_nodes(2).await.unwrap();
    network.settle().await;

    let hub = network.node(0);
    let joiner = network.node(1);

    // Each side knows the other under its real peer id.
    assert!(hub.registry().get(joiner.peer_id()).is_some());
    assert!(joiner.registry().get(hub.peer_id()).is_some());
    assert_eq!(hub.registry().active_count(), 1);
    assert_eq!(joiner.registry().active_count(), 1);
}

#[tokio::test]
async fn test_peer_list_reaches_later_joiners() {
    init_tracing();

    let network = TestNetwork::with_nodes(3).await.unwrap();
    network.settle().await;

    // The third node joined only through the hub, but the hub's peer list
    // push introduces it to the earlier joiner.
    let second = network.node(1);
    let third = network.node(2);
    assert!(third.registry().get(second.peer_id()).is_some());
}

#[tokio::test]
async fn test_ping_probes_liveness() {
    init_tracing();

    let network = TestNetwork::with_nodes(2).await.unwrap();
    network.settle().await;

    let hub = network.node(0);
    let joiner = network.node(1);

    let record = hub.registry().get(joiner.peer_id()).unwrap();
    assert!(hub.client().is_peer_alive(&record).await);

    // A dead endpoint fails the probe and demotes the peer.
    let ghost = PeerRecord::new(PeerId::from("ghost001"), "127.0.0.1", 1);
    hub.registry().add(ghost.clone());
    assert!(!hub.client().is_peer_alive(&ghost).await);
    assert!(!hub.registry().get(&ghost.id).unwrap().active);
}

#[tokio::test]
async fn test_failed_send_marks_peer_inactive_not_removed() {
    init_tracing();

    let network = TestNetwork::with_nodes(2).await.unwrap();
    network.settle().await;

    let hub = network.node(0);
    let joiner = network.node(1);
    joiner.stop().await;

    let record = hub.registry().get(joiner.peer_id()).unwrap();
    assert!(!hub.client().is_peer_alive(&record).await);

    // Inactive, but only eviction destroys the record.
    let record = hub.registry().get(joiner.peer_id()).unwrap();
    assert!(!record.active);
    assert_eq!(hub.registry().active_count(), 0);
    assert_eq!(hub.registry().all_peers().len(), 1);
}

#[tokio::test]
async fn test_stale_peer_evicted_after_timeout() {
    init_tracing();

    let registry = PeerRegistry::with_timeout(PeerId::from("local001"), 50);
    registry.add(PeerRecord::new(PeerId::from("peer0001"), "127.0.0.1", 4800));
    assert_eq!(registry.active_count(), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(registry.evict_stale(), 1);
    assert!(registry.active_peers().is_empty());
    assert!(registry.all_peers().is_empty());
}

#[tokio::test]
async fn test_manual_join_after_start() {
    init_tracing();

    let a = TestNode::start().await.unwrap();
    let b = TestNode::start().await.unwrap();

    assert!(b.join("127.0.0.1", a.addr().port()).await);
    assert!(b.registry().get(a.peer_id()).is_some());

    a.stop().await;
    b.stop().await;
}
