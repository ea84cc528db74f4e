use trellis::media::source::TrackKind;
use trellis::signaling::InMemoryRelay;

use crate::integration::{eventually, init_tracing, join_pair};

/// Screen share substitutes the display track into the existing video
/// sender and reverts to the parked camera when it stops.
#[tokio::test]
async fn test_screen_share_swaps_video_sender() {
    init_tracing();

    let relay = InMemoryRelay::new();
    let (alice, bob) = join_pair(&relay).await;
    let alice_t = alice.factory.for_peer("bob").unwrap();

    alice.session.toggle_screen_share().await;
    eventually("the display track to go live", || {
        alice_t
            .replacements()
            .contains(&(TrackKind::Video, Some("display-0".to_string())))
    })
    .await;

    alice.session.toggle_screen_share().await;
    eventually("the camera track to be restored", || {
        alice_t
            .replacements()
            .contains(&(TrackKind::Video, Some("cam-0".to_string())))
    })
    .await;

    alice.session.shutdown().await;
    bob.session.shutdown().await;
}
