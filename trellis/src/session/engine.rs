//! The session event loop. One task per joined room, selecting over user
//! commands, inbound signaling and connection feedback, so reconciliation
//! and negotiation for a session are serialized by construction.

use crate::config::{LocalIdentity, SessionConfig};
use crate::media::controller::LocalMediaController;
use crate::media::recording::{Recorder, RecordingInputs, StorageSink};
use crate::media::source::TrackKind;
use crate::peer::manager::{FollowUp, PeerManager};
use crate::roster;
use crate::session::command::SessionCommand;
use crate::session::event::SessionEvent;
use crate::session::SessionBackends;
use crate::signaling::channel::{SignalEvent, SignalingChannel};
use crate::signaling::relay::SignalingRelay;
use crate::transport::event::{ConnectionEvent, ConnectionEventKind};
use crate::transport::peer_transport::TransportFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};
use trellis_core::error::{ConnectivityError, JoinError, MediaError};
use trellis_core::model::participant::{Participant, ParticipantId};
use trellis_core::model::room::RoomId;
use trellis_core::negotiation::NegotiationEvent;
use trellis_core::status::ConnectionStatus;
use uuid::Uuid;

pub struct RoomEngine {
    identity: LocalIdentity,
    config: SessionConfig,
    relay: Arc<dyn SignalingRelay>,
    transport_factory: Arc<dyn TransportFactory>,
    media: LocalMediaController,
    recorder: Option<Arc<dyn Recorder>>,
    storage: Option<Arc<dyn StorageSink>>,
    command_rx: mpsc::Receiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    room: Option<JoinedRoom>,
}

struct JoinedRoom {
    id: RoomId,
    channel: SignalingChannel,
    signal_rx: mpsc::Receiver<SignalEvent>,
    manager: PeerManager,
    conn_tx: mpsc::Sender<ConnectionEvent>,
    conn_rx: mpsc::Receiver<ConnectionEvent>,
}

enum Tick {
    Command(Option<SessionCommand>),
    Signal(SignalEvent),
    Connection(ConnectionEvent),
}

impl RoomEngine {
    pub fn new(
        identity: LocalIdentity,
        config: SessionConfig,
        backends: SessionBackends,
        command_rx: mpsc::Receiver<SessionCommand>,
        events: broadcast::Sender<SessionEvent>,
        status_tx: watch::Sender<ConnectionStatus>,
    ) -> Self {
        Self {
            identity,
            config,
            relay: backends.relay,
            transport_factory: backends.transport,
            media: LocalMediaController::new(backends.media),
            recorder: backends.recorder,
            storage: backends.storage,
            command_rx,
            events,
            status_tx,
            room: None,
        }
    }

    pub async fn run(mut self) {
        info!("Session loop started for {}", self.identity.id);

        loop {
            let tick = match self.room.as_mut() {
                Some(room) => tokio::select! {
                    cmd = self.command_rx.recv() => Tick::Command(cmd),
                    Some(signal) = room.signal_rx.recv() => Tick::Signal(signal),
                    Some(event) = room.conn_rx.recv() => Tick::Connection(event),
                },
                None => Tick::Command(self.command_rx.recv().await),
            };

            match tick {
                Tick::Command(None) => break,
                Tick::Command(Some(SessionCommand::Shutdown)) => {
                    self.leave().await;
                    break;
                }
                Tick::Command(Some(command)) => self.handle_command(command).await,
                Tick::Signal(signal) => self.handle_signal(signal).await,
                Tick::Connection(event) => self.handle_connection_event(event).await,
            }
        }

        info!("Session loop finished for {}", self.identity.id);
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join(room_id) => self.join(room_id).await,
            SessionCommand::Leave => self.leave().await,
            SessionCommand::ToggleAudio => self.toggle_mute(TrackKind::Audio).await,
            SessionCommand::ToggleVideo => self.toggle_mute(TrackKind::Video).await,
            SessionCommand::ToggleScreenShare => {
                if self.media.state().is_screen_sharing {
                    self.stop_screen_share().await;
                } else {
                    self.start_screen_share().await;
                }
            }
            SessionCommand::ScreenShareEnded => {
                if self.media.state().is_screen_sharing {
                    self.stop_screen_share().await;
                }
            }
            SessionCommand::ToggleRecording => self.toggle_recording().await,
            SessionCommand::SwitchDevice { kind, device_id } => {
                self.switch_device(kind, &device_id).await;
            }
            SessionCommand::ReconnectPeers => self.reconnect_peers().await,
            SessionCommand::Shutdown => unreachable!("handled in run()"),
        }
    }

    async fn join(&mut self, room_id: RoomId) {
        if self.room.is_some() {
            warn!("Already in a room, ignoring join");
            return;
        }

        let mut attempt = 0;
        let (channel, signal_rx) = loop {
            attempt += 1;
            let (signal_tx, signal_rx) = mpsc::channel(256);
            match SignalingChannel::open(
                self.relay.clone(),
                room_id.clone(),
                self.identity.id.clone(),
                self.identity.display_name.clone(),
                signal_tx,
            )
            .await
            {
                Ok(channel) => break (channel, signal_rx),
                Err(e) => {
                    warn!("Join attempt {} for room {} failed: {}", attempt, room_id, e);
                    emit(&self.events, SessionEvent::Error(e.into()));
                    if attempt >= self.config.join_retry_limit {
                        emit(
                            &self.events,
                            SessionEvent::Error(
                                JoinError::RetriesExhausted(self.config.join_retry_limit).into(),
                            ),
                        );
                        return;
                    }
                    tokio::time::sleep(self.config.join_retry_delay).await;
                }
            }
        };

        for warning in self.media.acquire().await {
            emit(&self.events, SessionEvent::Error(warning.into()));
        }

        let (conn_tx, conn_rx) = mpsc::channel(256);
        let mut manager = PeerManager::new(
            self.identity.id.clone(),
            self.transport_factory.clone(),
            conn_tx.clone(),
        );
        manager
            .set_local_tracks(self.media.tracks().to_vec(), &channel)
            .await;

        info!("Joined room {}", room_id);
        self.room = Some(JoinedRoom {
            id: room_id.clone(),
            channel,
            signal_rx,
            manager,
            conn_tx,
            conn_rx,
        });
        emit(&self.events, SessionEvent::Joined(room_id));
        emit(
            &self.events,
            SessionEvent::MediaStateChanged(self.media.state()),
        );
    }

    async fn leave(&mut self) {
        let Some(mut room) = self.room.take() else {
            return;
        };
        room.manager.close_all().await;
        if let Err(e) = room.channel.close().await {
            warn!("Leave cleanup failed: {}", e);
        }
        self.media.release();

        let _ = self.status_tx.send_replace(ConnectionStatus::Connecting);
        emit(&self.events, SessionEvent::PeerListChanged(Vec::new()));
        emit(
            &self.events,
            SessionEvent::MediaStateChanged(self.media.state()),
        );
        emit(&self.events, SessionEvent::Left);
        info!("Left room {}", room.id);
    }

    async fn toggle_mute(&mut self, kind: TrackKind) {
        let enabled = self.media.toggle(kind);
        let track = if enabled {
            self.media.track_of(kind).cloned()
        } else {
            None
        };

        if let Some(room) = self.room.as_mut() {
            let follow_ups = room
                .manager
                .replace_track_everywhere(kind, track, &room.channel)
                .await;
            apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
        }
        emit(
            &self.events,
            SessionEvent::MediaStateChanged(self.media.state()),
        );
    }

    async fn switch_device(&mut self, kind: TrackKind, device_id: &str) {
        match self.media.switch_device(kind, device_id).await {
            Ok(Some(track)) => {
                // Same-kind swap: senders replace in place, no renegotiation.
                if self.media.enabled(kind) {
                    if let Some(room) = self.room.as_mut() {
                        let follow_ups = room
                            .manager
                            .replace_track_everywhere(kind, Some(track), &room.channel)
                            .await;
                        apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Device switch failed: {}", e);
                emit(&self.events, SessionEvent::Error(e.into()));
            }
        }
        emit(
            &self.events,
            SessionEvent::MediaStateChanged(self.media.state()),
        );
    }

    async fn start_screen_share(&mut self) {
        match self.media.start_screen_share().await {
            Ok(display) => {
                if let Some(room) = self.room.as_mut() {
                    let follow_ups = room
                        .manager
                        .replace_track_everywhere(TrackKind::Video, Some(display), &room.channel)
                        .await;
                    apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
                }
                emit(
                    &self.events,
                    SessionEvent::MediaStateChanged(self.media.state()),
                );
            }
            Err(e) => {
                warn!("Screen share failed: {}", e);
                emit(&self.events, SessionEvent::Error(e.into()));
            }
        }
    }

    async fn stop_screen_share(&mut self) {
        let camera = self.media.stop_screen_share();
        if let Some(room) = self.room.as_mut() {
            let restored = if self.media.enabled(TrackKind::Video) {
                camera
            } else {
                None
            };
            let follow_ups = room
                .manager
                .replace_track_everywhere(TrackKind::Video, restored, &room.channel)
                .await;
            apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
        }
        emit(
            &self.events,
            SessionEvent::MediaStateChanged(self.media.state()),
        );
    }

    async fn toggle_recording(&mut self) {
        let Some(room) = self.room.as_ref() else {
            emit(
                &self.events,
                SessionEvent::Error(JoinError::NotJoined.into()),
            );
            return;
        };

        if self.media.state().is_recording {
            self.media.set_recording(false);
            if let Some(recorder) = &self.recorder {
                match recorder.stop().await {
                    Ok(artifact) => {
                        if let Some(storage) = &self.storage {
                            let path = format!(
                                "recordings/{}/{}.webm",
                                room.id,
                                Uuid::new_v4()
                            );
                            match storage.upload(&path, artifact.data).await {
                                Ok(url) => {
                                    emit(&self.events, SessionEvent::RecordingSaved(url))
                                }
                                Err(e) => {
                                    emit(&self.events, SessionEvent::Error(e.into()))
                                }
                            }
                        }
                    }
                    Err(e) => emit(&self.events, SessionEvent::Error(e.into())),
                }
            }
        } else {
            let Some(recorder) = &self.recorder else {
                emit(
                    &self.events,
                    SessionEvent::Error(
                        MediaError::Recording("no recording pipeline configured".into()).into(),
                    ),
                );
                return;
            };
            let remote = room
                .manager
                .known_ids()
                .filter_map(|id| {
                    room.manager
                        .peer(id)
                        .map(|p| (id.clone(), p.remote_tracks.values().cloned().collect()))
                })
                .collect();
            let inputs = RecordingInputs {
                local: self.media.tracks().to_vec(),
                remote,
            };
            match recorder.start(inputs).await {
                Ok(()) => self.media.set_recording(true),
                Err(e) => emit(&self.events, SessionEvent::Error(e.into())),
            }
        }
        emit(
            &self.events,
            SessionEvent::MediaStateChanged(self.media.state()),
        );
    }

    async fn reconnect_peers(&mut self) {
        let Some(room) = self.room.as_mut() else {
            emit(
                &self.events,
                SessionEvent::Error(JoinError::NotJoined.into()),
            );
            return;
        };

        let peers: Vec<(ParticipantId, String)> = room
            .manager
            .known_ids()
            .filter_map(|id| {
                room.manager
                    .peer(id)
                    .map(|p| (id.clone(), p.display_name.clone()))
            })
            .collect();

        info!("Reconnecting {} peer(s)", peers.len());
        for (id, display_name) in peers {
            match room
                .manager
                .create_connection(&id, &display_name, true, &room.channel)
                .await
            {
                Ok(follow_ups) => {
                    apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups)
                }
                Err(e) => {
                    warn!("Reconnect to {} failed: {}", id, e);
                    emit(&self.events, SessionEvent::Error(e.into()));
                }
            }
        }
        emit(
            &self.events,
            SessionEvent::PeerListChanged(room.manager.summaries()),
        );
        update_status(&self.status_tx, &room.manager, &self.events);
    }

    async fn handle_signal(&mut self, signal: SignalEvent) {
        let Some(room) = self.room.as_mut() else {
            return;
        };

        match signal {
            SignalEvent::Presence(snapshot) => {
                self.reconcile(snapshot).await;
            }

            SignalEvent::Offer { from, desc, path } => {
                ensure_peer(room, &self.config, &self.events, &self.status_tx, &from).await;
                let follow_ups = room
                    .manager
                    .drive(&from, NegotiationEvent::RemoteOffer(desc), &room.channel)
                    .await;
                apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
                if let Err(e) = room.channel.consume(&path).await {
                    warn!("Failed to consume offer at {}: {}", path, e);
                }
                update_status(&self.status_tx, &room.manager, &self.events);
            }

            SignalEvent::Answer { from, desc, path } => {
                if room.manager.contains(&from) {
                    let follow_ups = room
                        .manager
                        .drive(&from, NegotiationEvent::RemoteAnswer(desc), &room.channel)
                        .await;
                    apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
                } else {
                    debug!("Answer from unknown peer {}", from);
                }
                if let Err(e) = room.channel.consume(&path).await {
                    warn!("Failed to consume answer at {}: {}", path, e);
                }
            }

            SignalEvent::Candidate {
                from,
                candidate,
                path,
            } => {
                ensure_peer(room, &self.config, &self.events, &self.status_tx, &from).await;
                let follow_ups = room
                    .manager
                    .drive(
                        &from,
                        NegotiationEvent::RemoteCandidate(candidate),
                        &room.channel,
                    )
                    .await;
                apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
                if let Err(e) = room.channel.consume(&path).await {
                    warn!("Failed to consume candidate at {}: {}", path, e);
                }
            }

            SignalEvent::Error(e) => {
                emit(&self.events, SessionEvent::Error(e.into()));
            }
        }
    }

    /// One synchronous diff-and-apply pass per presence snapshot. A snapshot
    /// arriving while this runs waits in the signal queue.
    async fn reconcile(&mut self, snapshot: HashMap<ParticipantId, Participant>) {
        let Some(room) = self.room.as_mut() else {
            return;
        };

        for (id, participant) in &snapshot {
            room.manager.set_display_name(id, &participant.display_name);
        }

        let delta = roster::diff(&self.identity.id, room.manager.known_ids(), &snapshot);
        if delta.added.is_empty() && delta.removed.is_empty() {
            return;
        }
        info!(
            "Roster change: {} joined, {} left",
            delta.added.len(),
            delta.removed.len()
        );

        for (id, participant) in delta.added {
            match room
                .manager
                .create_connection(&id, &participant.display_name, true, &room.channel)
                .await
            {
                Ok(follow_ups) => {
                    apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups)
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", id, e);
                    emit(&self.events, SessionEvent::Error(e.into()));
                }
            }
        }

        for id in delta.removed {
            room.manager.remove_peer(&id).await;
        }

        emit(
            &self.events,
            SessionEvent::PeerListChanged(room.manager.summaries()),
        );
        update_status(&self.status_tx, &room.manager, &self.events);
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        let Some(room) = self.room.as_mut() else {
            return;
        };
        if !room.manager.accepts_event(&event.peer_id, event.epoch) {
            debug!(
                "Dropping stale connection event for {} (epoch {})",
                event.peer_id, event.epoch
            );
            return;
        }
        let peer_id = event.peer_id;

        match event.kind {
            ConnectionEventKind::CandidateGenerated(candidate) => {
                if let Err(e) = room.channel.publish_candidate(&peer_id, &candidate).await {
                    warn!("Failed to publish candidate for {}: {}", peer_id, e);
                    emit(&self.events, SessionEvent::Error(e.into()));
                }
            }

            ConnectionEventKind::IceState(state) => {
                room.manager.update_ice(&peer_id, state);
                let follow_ups = room
                    .manager
                    .drive(&peer_id, NegotiationEvent::IceState(state), &room.channel)
                    .await;
                apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
                emit(
                    &self.events,
                    SessionEvent::PeerListChanged(room.manager.summaries()),
                );
                update_status(&self.status_tx, &room.manager, &self.events);
            }

            ConnectionEventKind::InboundTrack(track) => {
                if room.manager.handle_inbound_track(&peer_id, track) {
                    emit(&self.events, SessionEvent::RemoteStreamChanged(peer_id));
                }
            }

            ConnectionEventKind::NegotiationNeeded => {
                let follow_ups = room
                    .manager
                    .drive(&peer_id, NegotiationEvent::NegotiationNeeded, &room.channel)
                    .await;
                apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
            }

            ConnectionEventKind::RestartTimer => {
                let follow_ups = room
                    .manager
                    .drive(&peer_id, NegotiationEvent::IceRestartDue, &room.channel)
                    .await;
                apply_follow_ups(&self.config, room, &self.events, &self.status_tx, follow_ups);
            }
        }
    }
}

/// Presence and negotiation messages can race: an offer may arrive before the
/// roster snapshot that introduces its sender. Create the peer lazily instead
/// of dropping the message; presence fills in the display name later.
async fn ensure_peer(
    room: &mut JoinedRoom,
    config: &SessionConfig,
    events: &broadcast::Sender<SessionEvent>,
    status_tx: &watch::Sender<ConnectionStatus>,
    from: &ParticipantId,
) {
    if room.manager.contains(from) {
        return;
    }
    debug!("Message from {} ahead of presence, creating peer", from);
    match room
        .manager
        .create_connection(from, from.as_str(), false, &room.channel)
        .await
    {
        Ok(follow_ups) => {
            apply_follow_ups(config, room, events, status_tx, follow_ups);
            emit(
                events,
                SessionEvent::PeerListChanged(room.manager.summaries()),
            );
        }
        Err(e) => {
            warn!("Failed to create connection for {}: {}", from, e);
            emit(events, SessionEvent::Error(e.into()));
        }
    }
}

fn emit(events: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    // Send fails only when nobody subscribed, which is fine.
    let _ = events.send(event);
}

fn update_status(
    status_tx: &watch::Sender<ConnectionStatus>,
    manager: &PeerManager,
    events: &broadcast::Sender<SessionEvent>,
) {
    let status = manager.aggregate_status();
    if *status_tx.borrow() != status {
        let _ = status_tx.send_replace(status);
        emit(events, SessionEvent::ConnectionStatusChanged(status));
    }
}

fn apply_follow_ups(
    config: &SessionConfig,
    room: &JoinedRoom,
    events: &broadcast::Sender<SessionEvent>,
    status_tx: &watch::Sender<ConnectionStatus>,
    follow_ups: Vec<FollowUp>,
) {
    for follow_up in follow_ups {
        match follow_up {
            FollowUp::ScheduleIceRestart { peer_id, epoch } => {
                let tx = room.conn_tx.clone();
                let delay = config.ice_restart_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx
                        .send(ConnectionEvent {
                            peer_id,
                            epoch,
                            kind: ConnectionEventKind::RestartTimer,
                        })
                        .await;
                });
            }
            FollowUp::Abandoned { peer_id, attempts } => {
                emit(
                    events,
                    SessionEvent::Error(
                        ConnectivityError::RecreationExhausted(peer_id.to_string(), attempts)
                            .into(),
                    ),
                );
                emit(
                    events,
                    SessionEvent::PeerListChanged(room.manager.summaries()),
                );
                update_status(status_tx, &room.manager, events);
            }
        }
    }
}
