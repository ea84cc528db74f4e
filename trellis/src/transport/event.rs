use crate::media::source::RemoteTrack;
use trellis_core::model::participant::ParticipantId;
use trellis_core::model::signaling::IceCandidateInit;
use trellis_core::status::IceConnectionState;

/// Feedback from one peer's connection into the session loop. Every event
/// carries the connection epoch it originated from; events from a replaced
/// connection are dropped instead of applied to its successor.
#[derive(Debug)]
pub struct ConnectionEvent {
    pub peer_id: ParticipantId,
    pub epoch: u64,
    pub kind: ConnectionEventKind,
}

#[derive(Debug)]
pub enum ConnectionEventKind {
    CandidateGenerated(IceCandidateInit),
    IceState(IceConnectionState),
    InboundTrack(RemoteTrack),
    NegotiationNeeded,
    /// The delayed ICE-restart timer armed for this connection fired.
    RestartTimer,
}
