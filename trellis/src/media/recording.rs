//! Recording/export boundary. The engine hands the recorder a read-only view
//! of the local and remote streams; compositing and encoding live behind the
//! trait, the upload target behind [`StorageSink`].

use crate::media::source::{LocalTrack, RemoteTrack};
use async_trait::async_trait;
use trellis_core::error::MediaError;
use trellis_core::model::participant::ParticipantId;

pub struct RecordingInputs {
    pub local: Vec<LocalTrack>,
    pub remote: Vec<(ParticipantId, Vec<RemoteTrack>)>,
}

#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[async_trait]
pub trait Recorder: Send + Sync {
    async fn start(&self, inputs: RecordingInputs) -> Result<(), MediaError>;

    async fn stop(&self) -> Result<RecordingArtifact, MediaError>;
}

/// Storage collaborator for finished recordings.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn upload(&self, path: &str, data: Vec<u8>) -> Result<String, MediaError>;
}

/// Accepts starts and stops without producing output. Stands in when no
/// recording pipeline is configured.
pub struct NullRecorder;

#[async_trait]
impl Recorder for NullRecorder {
    async fn start(&self, _inputs: RecordingInputs) -> Result<(), MediaError> {
        Ok(())
    }

    async fn stop(&self) -> Result<RecordingArtifact, MediaError> {
        Ok(RecordingArtifact {
            data: Vec::new(),
            mime_type: "video/webm".to_string(),
        })
    }
}
