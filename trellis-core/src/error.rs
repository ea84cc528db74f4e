use thiserror::Error;

/// Local capture failures. Never fatal to joining a room: acquisition
/// degrades video -> audio-only -> no media, each step surfaced as a warning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("media device access denied: {0}")]
    PermissionDenied(String),
    #[error("no usable {0} device")]
    DeviceUnavailable(String),
    #[error("video capture failed, continuing audio-only: {0}")]
    VideoDegraded(String),
    #[error("audio capture failed, continuing without local media: {0}")]
    AudioDegraded(String),
    #[error("screen capture failed: {0}")]
    DisplayCapture(String),
    #[error("recording failed: {0}")]
    Recording(String),
}

/// Relay read/write failures. Surfaced to the caller, which decides whether
/// to retry; there is no automatic retry loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("relay write to {path} failed: {reason}")]
    Publish { path: String, reason: String },
    #[error("relay read from {path} failed: {reason}")]
    Subscribe { path: String, reason: String },
    #[error("malformed signaling payload at {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("relay disconnected")]
    Disconnected,
}

/// SDP apply failures and invalid signaling-state transitions. Recovered by
/// rollback where possible, otherwise by connection recreation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("failed to create {0:?}: {1}")]
    CreateDescription(crate::model::signaling::SdpKind, String),
    #[error("failed to apply remote description: {0}")]
    ApplyDescription(String),
    #[error("rollback rejected: {0}")]
    RollbackFailed(String),
    #[error("failed to add ICE candidate: {0}")]
    AddCandidate(String),
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectivityError {
    #[error("ICE failed for peer {0}")]
    IceFailed(String),
    #[error("connection to {0} abandoned after {1} failed rebuilds")]
    RecreationExhausted(String, u32),
    #[error("all peer connections failed")]
    AllFailed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("room {0} not found")]
    RoomNotFound(String),
    #[error("join aborted after {0} attempts")]
    RetriesExhausted(u32),
    #[error("not in a room")]
    NotJoined,
}

#[derive(Debug, Clone, Error)]
pub enum TrellisError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
    #[error(transparent)]
    Join(#[from] JoinError),
}
