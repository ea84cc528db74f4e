use trellis::media::source::TrackKind;
use trellis::session::SessionEvent;
use trellis::signaling::InMemoryRelay;

use crate::integration::{eventually, expect_event, init_tracing, join_pair};

/// Muting clears the live audio sender in place; unmuting restores the same
/// device's track. Neither direction renegotiates.
#[tokio::test]
async fn test_mute_toggle_swaps_senders() {
    init_tracing();

    let relay = InMemoryRelay::new();
    let (alice, bob) = join_pair(&relay).await;
    let alice_t = alice.factory.for_peer("bob").unwrap();
    let mut events = alice.session.subscribe();

    alice.session.toggle_audio().await;
    let state = expect_event(&mut events, "muted media state", |event| match event {
        SessionEvent::MediaStateChanged(state) => Some(state.clone()),
        _ => None,
    })
    .await;
    assert!(!state.audio_enabled);
    eventually("the audio sender to be cleared", || {
        alice_t.replacements().contains(&(TrackKind::Audio, None))
    })
    .await;

    alice.session.toggle_audio().await;
    eventually("the microphone track to come back", || {
        alice_t
            .replacements()
            .contains(&(TrackKind::Audio, Some("mic-0".to_string())))
    })
    .await;
    // In-place swaps never trigger a fresh offer round.
    assert_eq!(alice.factory.created_for("bob"), 1);

    alice.session.shutdown().await;
    bob.session.shutdown().await;
}
