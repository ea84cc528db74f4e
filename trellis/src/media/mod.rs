pub mod controller;
pub mod recording;
pub mod source;

pub use controller::{LocalMediaController, LocalMediaState};
pub use recording::{NullRecorder, Recorder, RecordingArtifact, RecordingInputs, StorageSink};
pub use source::{LocalTrack, MediaConstraints, MediaDeviceInfo, MediaSource, RemoteTrack, TrackKind};
