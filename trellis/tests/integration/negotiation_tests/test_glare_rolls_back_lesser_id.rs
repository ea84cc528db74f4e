use std::sync::Arc;
use tokio::sync::mpsc;
use trellis::core::model::signaling::SessionDescription;
use trellis::core::negotiation::NegotiationEvent;
use trellis::peer::PeerManager;
use trellis::signaling::{InMemoryRelay, SignalingChannel};

use crate::integration::init_tracing;
use crate::utils::MockTransportFactory;

/// Both sides have a pending offer. "bob" sorts above "alice", so alice's
/// manager must roll her offer back and answer bob's instead.
#[tokio::test]
async fn test_glare_rolls_back_lesser_id() {
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
    let (conn_tx, _conn_rx) = mpsc::channel(64);
    let mut manager = PeerManager::new("alice".into(), factory.clone(), conn_tx);

    manager
        .create_connection(&"bob".into(), "bob", true, &channel)
        .await
        .unwrap();
    let transport = factory.for_peer("bob").unwrap();
    assert_eq!(transport.offers(), vec![false]);

    // The colliding offer arrives while ours is pending.
    manager
        .drive(
            &"bob".into(),
            NegotiationEvent::RemoteOffer(SessionDescription::offer("bob-offer")),
            &channel,
        )
        .await;

    assert_eq!(transport.rollback_count(), 1);
    assert_eq!(transport.applied_offer_count(), 1);
    assert_eq!(transport.answer_count(), 1);
    assert!(relay.get("rooms/r1/answers/alice/bob").is_some());
    // No second connection was built; glare resolved in place.
    assert_eq!(factory.created_for("bob"), 1);
}
