use crate::media::controller::LocalMediaState;
use crate::peer::peer::PeerSummary;
use trellis_core::error::TrellisError;
use trellis_core::model::participant::ParticipantId;
use trellis_core::model::room::RoomId;
use trellis_core::status::ConnectionStatus;

/// What the session surfaces to the UI layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Joined(RoomId),
    Left,
    PeerListChanged(Vec<PeerSummary>),
    RemoteStreamChanged(ParticipantId),
    ConnectionStatusChanged(ConnectionStatus),
    MediaStateChanged(LocalMediaState),
    RecordingSaved(String),
    /// Non-fatal errors and degradation warnings, for dismissible banners.
    Error(TrellisError),
}
