use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use trellis_core::error::MediaError;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaDeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, Default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub audio_device_id: Option<String>,
    pub video_device_id: Option<String>,
}

impl MediaConstraints {
    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
            ..Default::default()
        }
    }

    pub fn audio_only() -> Self {
        Self {
            audio: true,
            ..Default::default()
        }
    }
}

/// One outgoing track plus the device it came from. Replaced wholesale on
/// device change so track identity stays meaningful to the senders.
#[derive(Clone)]
pub struct LocalTrack {
    pub kind: TrackKind,
    pub device_id: Option<String>,
    pub track: Arc<dyn TrackLocal + Send + Sync>,
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("kind", &self.kind)
            .field("device_id", &self.device_id)
            .field("id", &self.track.id())
            .finish()
    }
}

/// Inbound track surfaced by a peer's transport. `stream_id` is the remote
/// side's stream hint when it provides one.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    pub source: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Device capture boundary (camera, microphone, display). Platform backends
/// implement this; the engine only ever sees tracks.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<Vec<LocalTrack>, MediaError>;

    async fn acquire_display(&self) -> Result<LocalTrack, MediaError>;

    async fn list_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError>;
}
