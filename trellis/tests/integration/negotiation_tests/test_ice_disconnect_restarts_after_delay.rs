use trellis::core::status::{ConnectionStatus, IceConnectionState};
use trellis::signaling::InMemoryRelay;

use crate::integration::{eventually, init_tracing, join_pair, wait_for_status};

/// `disconnected` often self-heals, so the restart is delayed: the status
/// flips immediately but the restart offer only goes out after the timer.
#[tokio::test]
async fn test_ice_disconnect_restarts_after_delay() {
    init_tracing();

    let relay = InMemoryRelay::new();
    let (alice, bob) = join_pair(&relay).await;
    let alice_t = alice.factory.for_peer("bob").unwrap();
    let mut status = alice.session.status_watch();

    alice_t.emit_ice(IceConnectionState::Disconnected).await;
    wait_for_status(&mut status, ConnectionStatus::Disconnected).await;

    // The 50ms test timer fires and, with ICE still down, offers a restart.
    eventually("a delayed restart offer", || {
        alice_t.offers().last() == Some(&true)
    })
    .await;
    assert_eq!(alice.factory.created_for("bob"), 1);

    alice.session.shutdown().await;
    bob.session.shutdown().await;
}
