use trellis::core::status::{ConnectionStatus, IceConnectionState};
use trellis::signaling::InMemoryRelay;

use crate::integration::{eventually, init_tracing, join_pair, wait_for_status};

#[tokio::test]
async fn test_two_peers_converge() {
    init_tracing();

    let relay = InMemoryRelay::new();
    let (alice, bob) = join_pair(&relay).await;

    // Exactly one offer/answer exchange completes, whichever side ends up
    // answering: the answerer applied an offer, the offerer applied the
    // answer, and no second answer was ever produced.
    let alice_t = alice.factory.for_peer("bob").unwrap();
    let bob_t = bob.factory.for_peer("alice").unwrap();
    eventually("the pair to complete one offer/answer exchange", || {
        let alice_answered =
            alice_t.answer_count() == 1 && bob_t.applied_answer_count() == 1;
        let bob_answered =
            bob_t.answer_count() == 1 && alice_t.applied_answer_count() == 1;
        alice_answered != bob_answered
            && alice_t.answer_count() + bob_t.answer_count() == 1
    })
    .await;

    // Delivered descriptions are consumed from the relay.
    eventually("offers and answers to be consumed", || {
        relay.entry_count("rooms/r1/offers") == 0 && relay.entry_count("rooms/r1/answers") == 0
    })
    .await;

    // Trickle: a candidate from alice's transport lands on bob's and its
    // relay entry is cleaned up after delivery.
    alice_t
        .emit_candidate("candidate:1 1 udp 1 10.0.0.1 5000 typ host")
        .await;
    eventually("bob to apply alice's candidate", || {
        bob_t.candidate_count() == 1
    })
    .await;
    eventually("the candidate to be consumed", || {
        relay.entry_count("rooms/r1/candidates") == 0
    })
    .await;

    // ICE success on the single connection rolls up to the room status.
    let mut alice_status = alice.session.status_watch();
    let mut bob_status = bob.session.status_watch();
    alice_t.emit_ice(IceConnectionState::Connected).await;
    bob_t.emit_ice(IceConnectionState::Connected).await;
    wait_for_status(&mut alice_status, ConnectionStatus::Connected).await;
    wait_for_status(&mut bob_status, ConnectionStatus::Connected).await;

    alice.session.shutdown().await;
    bob.session.shutdown().await;
}
