pub mod command;
pub mod engine;
pub mod event;

pub use command::SessionCommand;
pub use event::SessionEvent;

use crate::config::{LocalIdentity, SessionConfig};
use crate::media::recording::{Recorder, StorageSink};
use crate::media::source::{MediaSource, TrackKind};
use crate::signaling::relay::SignalingRelay;
use crate::transport::peer_transport::TransportFactory;
use engine::RoomEngine;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use trellis_core::model::room::RoomId;
use trellis_core::status::ConnectionStatus;

/// The collaborators a session runs against. Production wires the hosted
/// relay and `RtcTransportFactory`; tests wire the in-memory relay and mocks.
pub struct SessionBackends {
    pub relay: Arc<dyn SignalingRelay>,
    pub transport: Arc<dyn TransportFactory>,
    pub media: Arc<dyn MediaSource>,
    pub recorder: Option<Arc<dyn Recorder>>,
    pub storage: Option<Arc<dyn StorageSink>>,
}

/// Handle to a running session loop. Commands are fire-and-forget; results
/// come back on the event stream and the status watch.
pub struct RoomSession {
    cmd_tx: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    status_rx: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl RoomSession {
    pub fn spawn(
        identity: LocalIdentity,
        config: SessionConfig,
        backends: SessionBackends,
    ) -> Self {
        let (cmd_tx, command_rx) = mpsc::channel(64);
        let (events, _) = broadcast::channel(256);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);

        let engine = RoomEngine::new(
            identity,
            config,
            backends,
            command_rx,
            events.clone(),
            status_tx,
        );
        let task = tokio::spawn(engine.run());

        Self {
            cmd_tx,
            events,
            status_rx,
            task,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub async fn join_room(&self, id: RoomId) {
        self.send(SessionCommand::Join(id)).await;
    }

    pub async fn leave_room(&self) {
        self.send(SessionCommand::Leave).await;
    }

    pub async fn toggle_audio(&self) {
        self.send(SessionCommand::ToggleAudio).await;
    }

    pub async fn toggle_video(&self) {
        self.send(SessionCommand::ToggleVideo).await;
    }

    pub async fn toggle_screen_share(&self) {
        self.send(SessionCommand::ToggleScreenShare).await;
    }

    pub async fn toggle_recording(&self) {
        self.send(SessionCommand::ToggleRecording).await;
    }

    pub async fn switch_device(&self, kind: TrackKind, device_id: impl Into<String>) {
        self.send(SessionCommand::SwitchDevice {
            kind,
            device_id: device_id.into(),
        })
        .await;
    }

    /// Manual recovery: tear down and re-establish every peer connection.
    pub async fn reconnect_peers(&self) {
        self.send(SessionCommand::ReconnectPeers).await;
    }

    pub async fn shutdown(self) {
        self.send(SessionCommand::Shutdown).await;
        let _ = self.task.await;
    }

    async fn send(&self, command: SessionCommand) {
        if self.cmd_tx.send(command).await.is_err() {
            tracing::error!("Session loop is gone, command dropped");
        }
    }
}
