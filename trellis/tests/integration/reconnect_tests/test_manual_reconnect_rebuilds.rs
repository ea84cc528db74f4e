use trellis::core::status::{ConnectionStatus, IceConnectionState};
use trellis::signaling::InMemoryRelay;

use crate::integration::{eventually, init_tracing, join_pair, wait_for_status};

/// Manual recovery after a dead connection: the session reports Failed,
/// reconnect tears every connection down, and the replacement negotiates
/// back to Connected.
#[tokio::test]
async fn test_manual_reconnect_rebuilds() {
    init_tracing();

    let relay = InMemoryRelay::new();
    let (alice, bob) = join_pair(&relay).await;
    let first = alice.factory.for_peer("bob").unwrap();
    eventually("the initial exchange to settle", || {
        first.applied_answer_count() + first.answer_count() == 1
    })
    .await;

    let mut status = alice.session.status_watch();
    first.emit_ice(IceConnectionState::Failed).await;
    wait_for_status(&mut status, ConnectionStatus::Failed).await;

    alice.session.reconnect_peers().await;

    eventually("a replacement connection", || {
        alice.factory.created_for("bob") == 2
    })
    .await;
    assert!(first.is_closed());

    // The rebuilt side always initiates; bob answers from stable.
    let second = alice.factory.for_peer("bob").unwrap();
    eventually("the replacement to negotiate", || {
        second.offers().len() == 1 && second.applied_answer_count() == 1
    })
    .await;

    second.emit_ice(IceConnectionState::Connected).await;
    wait_for_status(&mut status, ConnectionStatus::Connected).await;

    alice.session.shutdown().await;
    bob.session.shutdown().await;
}
