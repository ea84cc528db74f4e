//! Local capture lifecycle: acquisition with graceful degradation, device
//! switching, screen-share substitution, mute flags.
//!
//! The controller owns the outgoing tracks; live connections only ever
//! receive references through the peer manager's replace-track path.

use crate::media::source::{LocalTrack, MediaConstraints, MediaSource, TrackKind};
use std::sync::Arc;
use tracing::{info, warn};
use trellis_core::error::MediaError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalMediaState {
    pub has_audio: bool,
    pub has_video: bool,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub selected_audio_device: Option<String>,
    pub selected_video_device: Option<String>,
    pub is_screen_sharing: bool,
    pub is_recording: bool,
}

pub struct LocalMediaController {
    source: Arc<dyn MediaSource>,
    tracks: Vec<LocalTrack>,
    /// Camera track parked while a display track substitutes for it.
    parked_camera: Option<LocalTrack>,
    state: LocalMediaState,
}

impl LocalMediaController {
    pub fn new(source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            tracks: Vec::new(),
            parked_camera: None,
            state: LocalMediaState::default(),
        }
    }

    pub fn state(&self) -> LocalMediaState {
        self.state.clone()
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn track_of(&self, kind: TrackKind) -> Option<&LocalTrack> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    pub fn enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.state.audio_enabled,
            TrackKind::Video => self.state.video_enabled,
        }
    }

    /// Acquire camera + microphone, degrading to audio-only and then to no
    /// media. Each degradation step is returned as a warning; none of them
    /// prevents joining the room.
    pub async fn acquire(&mut self) -> Vec<MediaError> {
        let mut warnings = Vec::new();

        let tracks = match self.source.acquire(&MediaConstraints::audio_video()).await {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!("Video acquisition failed ({}), trying audio-only", e);
                warnings.push(MediaError::VideoDegraded(e.to_string()));
                match self.source.acquire(&MediaConstraints::audio_only()).await {
                    Ok(tracks) => tracks,
                    Err(e) => {
                        warn!("Audio acquisition failed ({}), joining without media", e);
                        warnings.push(MediaError::AudioDegraded(e.to_string()));
                        Vec::new()
                    }
                }
            }
        };

        self.install(tracks);
        warnings
    }

    fn install(&mut self, tracks: Vec<LocalTrack>) {
        self.state.has_audio = tracks.iter().any(|t| t.kind == TrackKind::Audio);
        self.state.has_video = tracks.iter().any(|t| t.kind == TrackKind::Video);
        self.state.audio_enabled = self.state.has_audio;
        self.state.video_enabled = self.state.has_video;
        self.state.selected_audio_device = tracks
            .iter()
            .find(|t| t.kind == TrackKind::Audio)
            .and_then(|t| t.device_id.clone());
        self.state.selected_video_device = tracks
            .iter()
            .find(|t| t.kind == TrackKind::Video)
            .and_then(|t| t.device_id.clone());
        self.tracks = tracks;
    }

    /// Re-acquire one kind from a specific device. Returns the track to swap
    /// into live senders, or `None` when the swap is internal (switching the
    /// camera while a display track is substituting for it).
    pub async fn switch_device(
        &mut self,
        kind: TrackKind,
        device_id: &str,
    ) -> Result<Option<LocalTrack>, MediaError> {
        let constraints = match kind {
            TrackKind::Audio => MediaConstraints {
                audio: true,
                audio_device_id: Some(device_id.to_string()),
                ..Default::default()
            },
            TrackKind::Video => MediaConstraints {
                video: true,
                video_device_id: Some(device_id.to_string()),
                ..Default::default()
            },
        };

        let mut acquired = self.source.acquire(&constraints).await?;
        let new_track = acquired
            .drain(..)
            .find(|t| t.kind == kind)
            .ok_or_else(|| MediaError::DeviceUnavailable(kind.to_string()))?;

        match kind {
            TrackKind::Audio => {
                self.state.selected_audio_device = Some(device_id.to_string());
                self.state.has_audio = true;
            }
            TrackKind::Video => {
                self.state.selected_video_device = Some(device_id.to_string());
                self.state.has_video = true;
            }
        }

        if kind == TrackKind::Video && self.state.is_screen_sharing {
            self.parked_camera = Some(new_track);
            return Ok(None);
        }

        self.tracks.retain(|t| t.kind != kind);
        self.tracks.push(new_track.clone());
        Ok(Some(new_track))
    }

    /// Substitute the outgoing video with a display-capture track.
    pub async fn start_screen_share(&mut self) -> Result<LocalTrack, MediaError> {
        if self.state.is_screen_sharing {
            return Err(MediaError::DisplayCapture("already sharing".into()));
        }
        let display = self.source.acquire_display().await?;

        self.parked_camera = self
            .tracks
            .iter()
            .find(|t| t.kind == TrackKind::Video)
            .cloned();
        self.tracks.retain(|t| t.kind != TrackKind::Video);
        self.tracks.push(display.clone());
        self.state.is_screen_sharing = true;
        info!("Screen share started");
        Ok(display)
    }

    /// Revert to the parked camera track. Returns it for the senders; `None`
    /// means there was no camera and outgoing video should be cleared.
    pub fn stop_screen_share(&mut self) -> Option<LocalTrack> {
        if !self.state.is_screen_sharing {
            return None;
        }
        self.state.is_screen_sharing = false;
        self.tracks.retain(|t| t.kind != TrackKind::Video);
        let camera = self.parked_camera.take();
        if let Some(camera) = &camera {
            self.tracks.push(camera.clone());
        }
        info!("Screen share stopped");
        camera
    }

    /// Flip the mute flag for one kind, returning the new value.
    pub fn toggle(&mut self, kind: TrackKind) -> bool {
        let flag = match kind {
            TrackKind::Audio => &mut self.state.audio_enabled,
            TrackKind::Video => &mut self.state.video_enabled,
        };
        *flag = !*flag;
        *flag
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.state.is_recording = recording;
    }

    /// Stop and drop every track. Called on leave and on teardown.
    pub fn release(&mut self) {
        self.tracks.clear();
        self.parked_camera = None;
        self.state = LocalMediaState::default();
    }
}
