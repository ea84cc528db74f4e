use trellis::core::model::signaling::SessionDescription;
use trellis::signaling::{InMemoryRelay, SignalingRelay};

use crate::integration::{eventually, init_tracing, spawn_peer};

/// Relay message ordering is not guaranteed: an offer can outrun the presence
/// entry that introduces its sender. The session must still answer it.
#[tokio::test]
async fn test_offer_before_presence_creates_peer() {
    init_tracing();

    let relay = InMemoryRelay::new();
    let alice = spawn_peer(&relay, "alice");
    alice.session.join_room("r1".into()).await;
    eventually("alice's presence to publish", || {
        relay.get("rooms/r1/participants/alice").is_some()
    })
    .await;

    let writer = relay.client();
    writer
        .put(
            "rooms/r1/offers/zed/alice",
            serde_json::to_value(SessionDescription::offer("zed-sdp")).unwrap(),
        )
        .await
        .unwrap();

    eventually("alice to answer the early offer", || {
        relay.get("rooms/r1/answers/alice/zed").is_some()
    })
    .await;
    let transport = alice.factory.for_peer("zed").unwrap();
    assert_eq!(transport.applied_offer_count(), 1);
    assert_eq!(transport.answer_count(), 1);
    // No local offer: the lazily created side is not the initiator.
    assert!(transport.offers().is_empty());

    alice.session.shutdown().await;
}
