//! Owns the participant-to-connection map and runs the negotiation state
//! machine's commands against the transports.

use crate::media::source::{LocalTrack, RemoteTrack, TrackKind};
use crate::peer::peer::{Connection, Peer, PeerSummary};
use crate::signaling::channel::SignalingChannel;
use crate::transport::event::ConnectionEvent;
use crate::transport::peer_transport::{PeerTransport, TransportFactory};
use std::collections::VecDeque;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use trellis_core::error::NegotiationError;
use trellis_core::model::participant::ParticipantId;
use trellis_core::model::signaling::SessionDescription;
use trellis_core::negotiation::{Negotiation, NegotiationCommand, NegotiationEvent};
use trellis_core::status::{ConnectionStatus, IceConnectionState, aggregate_status};

/// Bound on connection rebuilds per peer before giving up. Reset when a
/// connection is created externally or its ICE reaches connected.
pub const MAX_RECREATE_ATTEMPTS: u32 = 3;

/// Work the session loop must do outside the manager (timers need the loop's
/// own event channel, abandonment is surfaced on the event stream).
#[derive(Debug)]
pub enum FollowUp {
    ScheduleIceRestart { peer_id: ParticipantId, epoch: u64 },
    Abandoned { peer_id: ParticipantId, attempts: u32 },
}

pub struct PeerManager {
    local_id: ParticipantId,
    factory: Arc<dyn TransportFactory>,
    events: mpsc::Sender<ConnectionEvent>,
    peers: HashMap<ParticipantId, Peer>,
    next_epoch: u64,
    local_tracks: Vec<LocalTrack>,
}

impl PeerManager {
    pub fn new(
        local_id: ParticipantId,
        factory: Arc<dyn TransportFactory>,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            local_id,
            factory,
            events,
            peers: HashMap::new(),
            next_epoch: 0,
            local_tracks: Vec::new(),
        }
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn known_ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.peers.keys()
    }

    pub fn peer(&self, id: &ParticipantId) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub fn set_display_name(&mut self, id: &ParticipantId, name: &str) {
        if let Some(peer) = self.peers.get_mut(id) {
            if peer.display_name != name {
                peer.display_name = name.to_string();
            }
        }
    }

    pub fn summaries(&self) -> Vec<PeerSummary> {
        let mut summaries: Vec<PeerSummary> = self
            .peers
            .values()
            .map(|p| PeerSummary {
                id: p.id.clone(),
                display_name: p.display_name.clone(),
                negotiation: p.connection.as_ref().map(|c| c.negotiation.state()),
                ice_state: p.connection.as_ref().map(|c| c.ice_state),
                remote_track_count: p.remote_tracks.len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    pub fn aggregate_status(&self) -> ConnectionStatus {
        aggregate_status(
            self.peers
                .values()
                .filter_map(|p| p.connection.as_ref())
                .map(|c| c.ice_state),
        )
    }

    /// True when `epoch` still identifies the peer's current connection.
    /// Events from replaced connections fail this check and are dropped.
    pub fn accepts_event(&self, id: &ParticipantId, epoch: u64) -> bool {
        self.peers
            .get(id)
            .and_then(|p| p.connection.as_ref())
            .is_some_and(|c| c.epoch == epoch)
    }

    pub fn update_ice(&mut self, id: &ParticipantId, state: IceConnectionState) {
        if let Some(conn) = self.peers.get_mut(id).and_then(|p| p.connection.as_mut()) {
            conn.ice_state = state;
        }
    }

    /// Create (or recreate) the connection toward `id` and kick off
    /// negotiation. An existing connection is torn down first, so two racing
    /// create calls still leave exactly one live connection.
    pub async fn create_connection(
        &mut self,
        id: &ParticipantId,
        display_name: &str,
        initiator: bool,
        channel: &SignalingChannel,
    ) -> Result<Vec<FollowUp>, NegotiationError> {
        // An externally requested connection starts with a fresh rebuild
        // budget; only the internal recreation loop consumes it.
        if let Some(peer) = self.peers.get_mut(id) {
            peer.recreate_attempts = 0;
        }
        self.install_transport(id, display_name, initiator).await?;
        Ok(self
            .drive(id, NegotiationEvent::NegotiationNeeded, channel)
            .await)
    }

    async fn install_transport(
        &mut self,
        id: &ParticipantId,
        display_name: &str,
        initiator: bool,
    ) -> Result<(), NegotiationError> {
        if let Some(old) = self
            .peers
            .get_mut(id)
            .and_then(|p| p.connection.take())
        {
            info!("Replacing existing connection to {}", id);
            old.transport.close().await;
        }

        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let transport = self
            .factory
            .create(id.clone(), epoch, self.events.clone())
            .await?;

        for track in &self.local_tracks {
            if let Err(e) = transport.add_track(track.clone()).await {
                warn!("Failed to attach {} track for {}: {}", track.kind, id, e);
            }
        }

        let peer = self
            .peers
            .entry(id.clone())
            .or_insert_with(|| Peer::new(id.clone(), display_name.to_string()));
        peer.remote_tracks.clear();
        peer.stream_id = None;
        peer.connection = Some(Connection {
            epoch,
            initiator,
            transport,
            negotiation: Negotiation::new(self.local_id.clone(), id.clone(), initiator),
            ice_state: IceConnectionState::New,
        });
        debug!("Connection to {} installed (epoch {})", id, epoch);
        Ok(())
    }

    /// Close the peer's connection, keeping the peer record. Idempotent.
    pub async fn close_connection(&mut self, id: &ParticipantId) {
        if let Some(conn) = self.peers.get_mut(id).and_then(|p| p.connection.take()) {
            conn.transport.close().await;
            info!("Connection to {} closed", id);
        }
        if let Some(peer) = self.peers.get_mut(id) {
            peer.remote_tracks.clear();
            peer.stream_id = None;
        }
    }

    /// Drop the peer entirely (left the roster).
    pub async fn remove_peer(&mut self, id: &ParticipantId) -> bool {
        self.close_connection(id).await;
        self.peers.remove(id).is_some()
    }

    pub async fn close_all(&mut self) {
        let transports: Vec<Arc<dyn PeerTransport>> = self
            .peers
            .values_mut()
            .filter_map(|p| p.connection.take())
            .map(|c| c.transport)
            .collect();
        futures::future::join_all(transports.iter().map(|t| t.close())).await;
        self.peers.clear();
    }

    /// Feed one event into the peer's negotiation machine and execute every
    /// command it returns, looping on the completion events those commands
    /// produce. Runs to quiescence before the session loop takes the next
    /// message, which is what serializes per-peer negotiation.
    pub async fn drive(
        &mut self,
        id: &ParticipantId,
        event: NegotiationEvent,
        channel: &SignalingChannel,
    ) -> Vec<FollowUp> {
        if let NegotiationEvent::IceState(
            IceConnectionState::Connected | IceConnectionState::Completed,
        ) = &event
        {
            if let Some(peer) = self.peers.get_mut(id) {
                peer.recreate_attempts = 0;
            }
        }

        let mut queue = VecDeque::from([event]);
        let mut follow_ups = Vec::new();
        // The glare offer we may need to re-apply on a rebuilt connection
        // when rollback is unsupported. One shot, to avoid a recreate loop.
        let mut reapply: Option<SessionDescription> = None;

        while let Some(ev) = queue.pop_front() {
            let Some((commands, transport, epoch)) = self
                .peers
                .get_mut(id)
                .and_then(|p| p.connection.as_mut())
                .map(|c| (c.negotiation.handle(ev), c.transport.clone(), c.epoch))
            else {
                break;
            };

            for command in commands {
                match command {
                    NegotiationCommand::CreateOffer { ice_restart } => {
                        match transport.create_offer(ice_restart).await {
                            Ok(desc) => match channel.publish_offer(id, &desc).await {
                                Ok(()) => queue.push_back(NegotiationEvent::OfferSent),
                                Err(e) => {
                                    warn!("Failed to publish offer to {}: {}", id, e);
                                    queue.push_back(NegotiationEvent::OfferFailed(e.to_string()));
                                }
                            },
                            Err(e) => {
                                warn!("Failed to create offer for {}: {}", id, e);
                                queue.push_back(NegotiationEvent::OfferFailed(e.to_string()));
                            }
                        }
                    }

                    NegotiationCommand::AcceptOffer(desc) => {
                        match accept_offer(transport.as_ref(), channel, id, desc).await {
                            Ok(()) => {
                                queue.push_back(NegotiationEvent::RemoteDescriptionApplied)
                            }
                            Err(e) => {
                                warn!("Failed to accept offer from {}: {}", id, e);
                                queue.push_back(NegotiationEvent::ApplyFailed(e.to_string()));
                            }
                        }
                    }

                    NegotiationCommand::RollbackAndAccept(desc) => {
                        match transport.rollback_local().await {
                            Ok(()) => {
                                info!("Rolled back local offer for {} (glare)", id);
                                match accept_offer(transport.as_ref(), channel, id, desc).await {
                                    Ok(()) => queue
                                        .push_back(NegotiationEvent::RemoteDescriptionApplied),
                                    Err(e) => queue
                                        .push_back(NegotiationEvent::ApplyFailed(e.to_string())),
                                }
                            }
                            Err(e) => {
                                warn!("Rollback for {} failed: {}", id, e);
                                reapply = Some(desc);
                                queue.push_back(NegotiationEvent::RollbackFailed(e.to_string()));
                            }
                        }
                    }

                    NegotiationCommand::ApplyAnswer(desc) => {
                        match transport.set_remote_description(desc).await {
                            Ok(()) => {
                                queue.push_back(NegotiationEvent::RemoteDescriptionApplied)
                            }
                            Err(e) => {
                                warn!("Failed to apply answer from {}: {}", id, e);
                                queue.push_back(NegotiationEvent::ApplyFailed(e.to_string()));
                            }
                        }
                    }

                    NegotiationCommand::ApplyCandidate(candidate) => {
                        if let Err(e) = transport.add_ice_candidate(candidate).await {
                            warn!("Failed to add ICE candidate from {}: {}", id, e);
                        }
                    }

                    NegotiationCommand::ScheduleIceRestart => {
                        follow_ups.push(FollowUp::ScheduleIceRestart {
                            peer_id: id.clone(),
                            epoch,
                        });
                    }

                    NegotiationCommand::RecreateConnection => {
                        let (initiator, display_name, attempts) = match self.peers.get_mut(id) {
                            Some(p) => {
                                p.recreate_attempts += 1;
                                (
                                    p.connection.as_ref().map(|c| c.initiator).unwrap_or(true),
                                    p.display_name.clone(),
                                    p.recreate_attempts,
                                )
                            }
                            None => break,
                        };
                        if attempts > MAX_RECREATE_ATTEMPTS {
                            error!(
                                "Abandoning connection to {} after {} rebuild attempts",
                                id, MAX_RECREATE_ATTEMPTS
                            );
                            self.close_connection(id).await;
                            follow_ups.push(FollowUp::Abandoned {
                                peer_id: id.clone(),
                                attempts: MAX_RECREATE_ATTEMPTS,
                            });
                            break;
                        }
                        info!("Recreating connection to {} (attempt {})", id, attempts);
                        if let Err(e) =
                            self.install_transport(id, &display_name, initiator).await
                        {
                            error!("Failed to recreate connection to {}: {}", id, e);
                            break;
                        }
                        match reapply.take() {
                            Some(desc) => queue.push_back(NegotiationEvent::RemoteOffer(desc)),
                            None => queue.push_back(NegotiationEvent::NegotiationNeeded),
                        }
                    }

                    NegotiationCommand::Ignore(reason) => {
                        debug!("Negotiation with {}: ignored event ({})", id, reason);
                    }
                }
            }
        }

        follow_ups
    }

    /// Make the outgoing track set current on every live connection. Tracks
    /// the senders didn't have yet are added, which renegotiates.
    pub async fn set_local_tracks(
        &mut self,
        tracks: Vec<LocalTrack>,
        channel: &SignalingChannel,
    ) -> Vec<FollowUp> {
        self.local_tracks = tracks.clone();
        let mut follow_ups = Vec::new();

        for track in tracks {
            let enabled = Some(track.clone());
            follow_ups.extend(
                self.replace_track_everywhere(track.kind, enabled, channel)
                    .await,
            );
        }
        follow_ups
    }

    /// Same-kind swap on every live connection; `None` mutes. In-place swaps
    /// never renegotiate; a connection without that sender gets the track
    /// added and renegotiates.
    pub async fn replace_track_everywhere(
        &mut self,
        kind: TrackKind,
        track: Option<LocalTrack>,
        channel: &SignalingChannel,
    ) -> Vec<FollowUp> {
        // Mirror the outgoing set first so rebuilt connections attach the
        // post-swap tracks: a `None` swap removes the kind, which is what
        // keeps a mute in force across recreation.
        self.local_tracks.retain(|t| t.kind != kind);
        if let Some(track) = &track {
            self.local_tracks.push(track.clone());
        }

        let ids: Vec<ParticipantId> = self
            .peers
            .iter()
            .filter(|(_, p)| p.connection.is_some())
            .map(|(id, _)| id.clone())
            .collect();

        let mut follow_ups = Vec::new();
        for id in ids {
            let Some(transport) = self
                .peers
                .get(&id)
                .and_then(|p| p.connection.as_ref())
                .map(|c| c.transport.clone())
            else {
                continue;
            };
            match transport.replace_track(kind, track.clone()).await {
                Ok(true) => {}
                Ok(false) => {
                    follow_ups.extend(
                        self.drive(&id, NegotiationEvent::NegotiationNeeded, channel)
                            .await,
                    );
                }
                Err(e) => warn!("Track replacement failed for {}: {}", id, e),
            }
        }
        follow_ups
    }

    /// Record an inbound track against the peer's composite stream,
    /// deduplicating by track identity. Returns true when the stream changed.
    pub fn handle_inbound_track(&mut self, id: &ParticipantId, track: RemoteTrack) -> bool {
        let Some(peer) = self.peers.get_mut(id) else {
            warn!("Inbound track from unknown peer {}", id);
            return false;
        };
        if peer.remote_tracks.contains_key(&track.id) {
            return false;
        }
        if peer.stream_id.is_none() {
            peer.stream_id = Some(if track.stream_id.is_empty() {
                format!("{id}-composite")
            } else {
                track.stream_id.clone()
            });
        }
        debug!("Peer {} now has {} remote track(s)", id, peer.remote_tracks.len() + 1);
        peer.remote_tracks.insert(track.id.clone(), track);
        true
    }
}

async fn accept_offer(
    transport: &dyn PeerTransport,
    channel: &SignalingChannel,
    id: &ParticipantId,
    desc: SessionDescription,
) -> Result<(), NegotiationError> {
    transport.set_remote_description(desc).await?;
    let answer = transport.create_answer().await?;
    channel
        .publish_answer(id, &answer)
        .await
        .map_err(|e| NegotiationError::Transport(e.to_string()))?;
    Ok(())
}
