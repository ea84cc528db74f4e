//! `PeerTransport` over webrtc-rs.

use crate::media::source::{LocalTrack, RemoteTrack, TrackKind};
use crate::transport::event::{ConnectionEvent, ConnectionEventKind};
use crate::transport::peer_transport::{PeerTransport, TransportFactory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use trellis_core::error::NegotiationError;
use trellis_core::model::participant::ParticipantId;
use trellis_core::model::signaling::{
    IceCandidateInit, IceServerConfig, SdpKind, SessionDescription,
};
use trellis_core::status::{IceConnectionState, SignalingState};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_remote::TrackRemote;

pub struct RtcTransportFactory {
    pub ice_servers: Vec<IceServerConfig>,
}

impl RtcTransportFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self { ice_servers }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        peer_id: ParticipantId,
        epoch: u64,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn PeerTransport>, NegotiationError> {
        let transport = RtcTransport::connect(peer_id, epoch, self.ice_servers.clone(), events)
            .await
            .map_err(|e| NegotiationError::Transport(format!("{e:#}")))?;
        Ok(Arc::new(transport))
    }
}

pub struct RtcTransport {
    peer_id: ParticipantId,
    pc: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<TrackKind, Arc<RTCRtpSender>>>,
}

impl RtcTransport {
    pub async fn connect(
        peer_id: ParticipantId,
        epoch: u64,
        ice_servers: Vec<IceServerConfig>,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .context("codec registration failed")?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .context("interceptor registration failed")?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers
                .into_iter()
                .map(|s| RTCIceServer {
                    urls: s.urls,
                    username: s.username.unwrap_or_default(),
                    credential: s.credential.unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("failed to create peer connection")?,
        );

        let ice_tx = events.clone();
        let uid_ice = peer_id.clone();
        pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let uid = uid_ice.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx
                    .send(ConnectionEvent {
                        peer_id: uid,
                        epoch,
                        kind: ConnectionEventKind::CandidateGenerated(IceCandidateInit {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                        }),
                    })
                    .await;
            })
        }));

        let state_tx = events.clone();
        let uid_state = peer_id.clone();
        pc.on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
            let tx = state_tx.clone();
            let uid = uid_state.clone();

            Box::pin(async move {
                info!("ICE state for peer {}: {}", uid, s);
                let _ = tx
                    .send(ConnectionEvent {
                        peer_id: uid,
                        epoch,
                        kind: ConnectionEventKind::IceState(map_ice_state(s)),
                    })
                    .await;
            })
        }));

        let track_tx = events.clone();
        let uid_track = peer_id.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let tx = track_tx.clone();
            let uid = uid_track.clone();

            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    RTPCodecType::Unspecified => {
                        warn!("Dropping inbound track of unspecified kind from {}", uid);
                        return;
                    }
                };
                debug!("Inbound {} track from {}", kind, uid);
                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                    source: Some(track),
                };
                let _ = tx
                    .send(ConnectionEvent {
                        peer_id: uid,
                        epoch,
                        kind: ConnectionEventKind::InboundTrack(remote),
                    })
                    .await;
            })
        }));

        let neg_tx = events;
        let uid_neg = peer_id.clone();
        pc.on_negotiation_needed(Box::new(move || {
            let tx = neg_tx.clone();
            let uid = uid_neg.clone();

            Box::pin(async move {
                let _ = tx
                    .send(ConnectionEvent {
                        peer_id: uid,
                        epoch,
                        kind: ConnectionEventKind::NegotiationNeeded,
                    })
                    .await;
            })
        }));

        Ok(Self {
            peer_id,
            pc,
            senders: Mutex::new(HashMap::new()),
        })
    }

    fn sender_of(&self, kind: TrackKind) -> Option<Arc<RTCRtpSender>> {
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
    }

    fn remember_sender(&self, kind: TrackKind, sender: Arc<RTCRtpSender>) {
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind, sender);
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn create_offer(
        &self,
        ice_restart: bool,
    ) -> Result<SessionDescription, NegotiationError> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = self
            .pc
            .create_offer(options)
            .await
            .map_err(|e| NegotiationError::CreateDescription(SdpKind::Offer, e.to_string()))?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| NegotiationError::CreateDescription(SdpKind::Offer, e.to_string()))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| NegotiationError::CreateDescription(SdpKind::Answer, e.to_string()))?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(|e| NegotiationError::CreateDescription(SdpKind::Answer, e.to_string()))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let rtc_desc = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
            SdpKind::Rollback => {
                return Err(NegotiationError::ApplyDescription(
                    "rollback is not a remote description".into(),
                ));
            }
        }
        .map_err(|e| NegotiationError::ApplyDescription(e.to_string()))?;

        self.pc
            .set_remote_description(rtc_desc)
            .await
            .map_err(|e| NegotiationError::ApplyDescription(e.to_string()))
    }

    async fn rollback_local(&self) -> Result<(), NegotiationError> {
        let mut rollback = RTCSessionDescription::default();
        rollback.sdp_type = RTCSdpType::Rollback;
        self.pc
            .set_local_description(rollback)
            .await
            .map_err(|e| NegotiationError::RollbackFailed(e.to_string()))
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidateInit,
    ) -> Result<(), NegotiationError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: None,
            })
            .await
            .map_err(|e| NegotiationError::AddCandidate(e.to_string()))
    }

    async fn add_track(&self, track: LocalTrack) -> Result<(), NegotiationError> {
        let sender = self
            .pc
            .add_track(track.track)
            .await
            .map_err(|e| NegotiationError::Transport(e.to_string()))?;
        self.remember_sender(track.kind, sender);
        Ok(())
    }

    async fn replace_track(
        &self,
        kind: TrackKind,
        track: Option<LocalTrack>,
    ) -> Result<bool, NegotiationError> {
        match (self.sender_of(kind), track) {
            (Some(sender), track) => {
                sender
                    .replace_track(track.map(|t| t.track))
                    .await
                    .map_err(|e| NegotiationError::Transport(e.to_string()))?;
                Ok(true)
            }
            (None, Some(track)) => {
                self.add_track(track).await?;
                Ok(false)
            }
            // Clearing a sender that never existed is a no-op.
            (None, None) => Ok(true),
        }
    }

    fn signaling_state(&self) -> SignalingState {
        match self.pc.signaling_state() {
            RTCSignalingState::Stable => SignalingState::Stable,
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                SignalingState::HaveLocalOffer
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
                SignalingState::HaveRemoteOffer
            }
            RTCSignalingState::Closed | RTCSignalingState::Unspecified => SignalingState::Closed,
        }
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!("Error closing connection to {}: {}", self.peer_id, e);
        }
    }
}

fn map_ice_state(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::New | RTCIceConnectionState::Unspecified => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
    }
}
