use std::sync::Arc;
use tokio::sync::mpsc;
use trellis::peer::{FollowUp, PeerManager};
use trellis::signaling::{InMemoryRelay, SignalingChannel};

use crate::integration::init_tracing;
use crate::utils::MockTransportFactory;

/// A transport that can never produce an offer must not rebuild forever. The
/// manager retries a bounded number of times, then closes the connection and
/// reports the abandonment.
#[tokio::test]
async fn test_offer_failure_gives_up() {
    init_tracing();

    let relay = InMemoryRelay::new();
    let (signal_tx, _signal_rx) = mpsc::channel(64);
    let channel = SignalingChannel::open(
        Arc::new(relay.client()),
        "r1".into(),
        "alice".into(),
        "alice".into(),
        signal_tx,
    )
    .await
    .unwrap();

    let factory = Arc::new(MockTransportFactory::default());
    factory.set_fail_offers(true);
    let (conn_tx, _conn_rx) = mpsc::channel(64);
    let mut manager = PeerManager::new("alice".into(), factory.clone(), conn_tx);

    let follow_ups = manager
        .create_connection(&"bob".into(), "bob", true, &channel)
        .await
        .unwrap();

    // The initial transport plus the bounded rebuilds, then nothing more.
    assert_eq!(factory.created_for("bob"), 4);
    assert!(matches!(
        follow_ups.as_slice(),
        [FollowUp::Abandoned { attempts: 3, .. }]
    ));
    assert!(factory.for_peer("bob").unwrap().is_closed());
    assert!(manager.peer(&"bob".into()).unwrap().connection.is_none());

    // A fresh external create gets a fresh budget.
    factory.set_fail_offers(false);
    manager
        .create_connection(&"bob".into(), "bob", true, &channel)
        .await
        .unwrap();
    assert_eq!(factory.created_for("bob"), 5);
    let fresh = factory.for_peer("bob").unwrap();
    assert_eq!(fresh.offers(), vec![false]);
    assert!(manager.peer(&"bob".into()).unwrap().connection.is_some());
}
