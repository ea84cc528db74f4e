use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use trellis::core::error::MediaError;
use trellis::media::source::{
    LocalTrack, MediaConstraints, MediaDeviceInfo, MediaSource, TrackKind,
};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

pub fn track(kind: TrackKind, id: &str, device: &str) -> LocalTrack {
    let mime = match kind {
        TrackKind::Audio => MIME_TYPE_OPUS,
        TrackKind::Video => MIME_TYPE_VP8,
    };
    LocalTrack {
        kind,
        device_id: Some(device.to_string()),
        track: Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime.to_owned(),
                ..Default::default()
            },
            id.to_owned(),
            "local".to_owned(),
        )),
    }
}

/// Capture backend serving synthetic tracks, with switchable failure modes
/// for the degradation paths.
#[derive(Default)]
pub struct MockMediaSource {
    pub fail_video: AtomicBool,
    pub fail_audio: AtomicBool,
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<Vec<LocalTrack>, MediaError> {
        if constraints.video && self.fail_video.load(Ordering::SeqCst) {
            return Err(MediaError::DeviceUnavailable("video".to_string()));
        }
        if constraints.audio && self.fail_audio.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("audio".to_string()));
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            let device = constraints.audio_device_id.as_deref().unwrap_or("mic-0");
            tracks.push(track(TrackKind::Audio, "audio", device));
        }
        if constraints.video {
            let device = constraints.video_device_id.as_deref().unwrap_or("cam-0");
            tracks.push(track(TrackKind::Video, "video", device));
        }
        Ok(tracks)
    }

    async fn acquire_display(&self) -> Result<LocalTrack, MediaError> {
        Ok(track(TrackKind::Video, "screen", "display-0"))
    }

    async fn list_devices(&self) -> Result<Vec<MediaDeviceInfo>, MediaError> {
        Ok(vec![
            MediaDeviceInfo {
                id: "mic-0".to_string(),
                label: "Mock microphone".to_string(),
                kind: TrackKind::Audio,
            },
            MediaDeviceInfo {
                id: "cam-0".to_string(),
                label: "Mock camera".to_string(),
                kind: TrackKind::Video,
            },
        ])
    }
}
