use crate::media::source::{LocalTrack, TrackKind};
use crate::transport::event::ConnectionEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use trellis_core::error::NegotiationError;
use trellis_core::model::participant::ParticipantId;
use trellis_core::model::signaling::{IceCandidateInit, SessionDescription};
use trellis_core::status::SignalingState;

/// One negotiated transport session toward a peer. The production
/// implementation wraps `webrtc`'s `RTCPeerConnection`; tests substitute a
/// scripted mock, which keeps the negotiation paths runnable without ICE.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create an offer and install it as the local description.
    async fn create_offer(&self, ice_restart: bool)
    -> Result<SessionDescription, NegotiationError>;

    /// Create an answer to the current remote offer and install it locally.
    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError>;

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError>;

    /// Undo a pending local offer. Not every transport supports this; a
    /// failure makes the caller fall back to connection recreation.
    async fn rollback_local(&self) -> Result<(), NegotiationError>;

    async fn add_ice_candidate(&self, candidate: IceCandidateInit)
    -> Result<(), NegotiationError>;

    async fn add_track(&self, track: LocalTrack) -> Result<(), NegotiationError>;

    /// Swap the sender of `kind` in place (`None` clears it, muting).
    /// Returns `false` when no such sender existed and the track was added
    /// instead, which requires renegotiation.
    async fn replace_track(
        &self,
        kind: TrackKind,
        track: Option<LocalTrack>,
    ) -> Result<bool, NegotiationError>;

    fn signaling_state(&self) -> SignalingState;

    async fn close(&self);
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        peer_id: ParticipantId,
        epoch: u64,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn PeerTransport>, NegotiationError>;
}
