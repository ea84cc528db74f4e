use std::sync::Arc;
use tokio::sync::mpsc;
use trellis::core::model::signaling::SessionDescription;
use trellis::core::negotiation::NegotiationEvent;
use trellis::peer::PeerManager;
use trellis::signaling::{InMemoryRelay, SignalingChannel};

use crate::integration::init_tracing;
use crate::utils::MockTransportFactory;

/// When the transport rejects rollback, the losing side rebuilds the
/// connection and applies the colliding offer on the fresh transport instead
/// of offering again, which would just reproduce the glare.
#[tokio::test]
async fn test_rollback_failure_reapplies_offer() {
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
    factory.set_fail_rollback(true);
    let (conn_tx, _conn_rx) = mpsc::channel(64);
    let mut manager = PeerManager::new("alice".into(), factory.clone(), conn_tx);

    manager
        .create_connection(&"bob".into(), "bob", true, &channel)
        .await
        .unwrap();
    let first = factory.first_for("bob").unwrap();

    manager
        .drive(
            &"bob".into(),
            NegotiationEvent::RemoteOffer(SessionDescription::offer("bob-offer")),
            &channel,
        )
        .await;

    assert_eq!(first.rollback_count(), 1);
    assert!(first.is_closed());
    assert_eq!(factory.created_for("bob"), 2);

    let second = factory.for_peer("bob").unwrap();
    assert!(second.offers().is_empty());
    assert_eq!(second.applied_offer_count(), 1);
    assert_eq!(second.answer_count(), 1);
    assert!(relay.get("rooms/r1/answers/alice/bob").is_some());

    // Only the replacement connection's events are accepted now.
    assert!(manager.accepts_event(&"bob".into(), second.epoch()));
    assert!(!manager.accepts_event(&"bob".into(), first.epoch()));
}
