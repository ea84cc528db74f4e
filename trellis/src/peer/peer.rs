use crate::media::source::RemoteTrack;
use crate::transport::peer_transport::PeerTransport;
use std::collections::HashMap;
use std::sync::Arc;
use trellis_core::negotiation::{Negotiation, NegotiationState};
use trellis_core::model::participant::ParticipantId;
use trellis_core::status::IceConnectionState;

/// One negotiated transport session plus its protocol state. The epoch is
/// bumped on every recreation so stale async continuations and transport
/// events can be recognized and dropped.
pub struct Connection {
    pub epoch: u64,
    pub initiator: bool,
    pub transport: Arc<dyn PeerTransport>,
    pub negotiation: Negotiation,
    pub ice_state: IceConnectionState,
}

/// Everything we track about one remote participant. At most one live
/// `Connection` exists per peer at any time.
pub struct Peer {
    pub id: ParticipantId,
    pub display_name: String,
    pub connection: Option<Connection>,
    /// Consecutive connection rebuilds; bounded by the manager so a
    /// persistently failing transport cannot recreate forever.
    pub recreate_attempts: u32,
    /// Inbound tracks keyed by track id; together they form the peer's
    /// composite remote stream.
    pub remote_tracks: HashMap<String, RemoteTrack>,
    /// Stream id from the transport's hint, or synthesized on first track.
    pub stream_id: Option<String>,
}

impl Peer {
    pub fn new(id: ParticipantId, display_name: String) -> Self {
        Self {
            id,
            display_name,
            connection: None,
            recreate_attempts: 0,
            remote_tracks: HashMap::new(),
            stream_id: None,
        }
    }
}

/// Snapshot of a peer for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub id: ParticipantId,
    pub display_name: String,
    pub negotiation: Option<NegotiationState>,
    pub ice_state: Option<IceConnectionState>,
    pub remote_track_count: usize,
}
