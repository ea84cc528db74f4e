use crate::media::source::TrackKind;
use trellis_core::model::room::RoomId;

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Join(RoomId),
    Leave,
    ToggleAudio,
    ToggleVideo,
    ToggleScreenShare,
    /// The capture backend reported the share was ended outside our UI
    /// (browser chrome, OS control). Reverts like an explicit stop.
    ScreenShareEnded,
    ToggleRecording,
    SwitchDevice { kind: TrackKind, device_id: String },
    ReconnectPeers,
    Shutdown,
}
