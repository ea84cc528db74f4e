use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use trellis::core::error::NegotiationError;
use trellis::core::model::participant::ParticipantId;
use trellis::core::model::signaling::{IceCandidateInit, SdpKind, SessionDescription};
use trellis::core::status::{IceConnectionState, SignalingState};
use trellis::media::source::{LocalTrack, TrackKind};
use trellis::transport::event::{ConnectionEvent, ConnectionEventKind};
use trellis::transport::peer_transport::{PeerTransport, TransportFactory};

/// Scripted transport that records every call and lets the test inject
/// connection events, so negotiation runs end to end without ICE.
pub struct MockTransport {
    peer_id: ParticipantId,
    epoch: u64,
    events: mpsc::Sender<ConnectionEvent>,
    fail_rollback: bool,
    fail_offers: bool,
    state: Mutex<SignalingState>,
    /// `ice_restart` flag of every offer created, in order.
    offers: Mutex<Vec<bool>>,
    answers: AtomicUsize,
    rollbacks: AtomicUsize,
    applied: Mutex<Vec<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidateInit>>,
    senders: Mutex<HashSet<TrackKind>>,
    replacements: Mutex<Vec<(TrackKind, Option<String>)>>,
    closed: AtomicBool,
    seq: AtomicU64,
}

impl MockTransport {
    pub fn peer_id(&self) -> &ParticipantId {
        &self.peer_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn offers(&self) -> Vec<bool> {
        self.offers.lock().unwrap().clone()
    }

    pub fn answer_count(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn applied_offer_count(&self) -> usize {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.kind == SdpKind::Offer)
            .count()
    }

    pub fn applied_answer_count(&self) -> usize {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.kind == SdpKind::Answer)
            .count()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.lock().unwrap().len()
    }

    pub fn replacements(&self) -> Vec<(TrackKind, Option<String>)> {
        self.replacements.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Kinds with an attached sender, in no particular order.
    pub fn sender_kinds(&self) -> Vec<TrackKind> {
        self.senders.lock().unwrap().iter().copied().collect()
    }

    pub async fn emit_ice(&self, state: IceConnectionState) {
        let _ = self
            .events
            .send(ConnectionEvent {
                peer_id: self.peer_id.clone(),
                epoch: self.epoch,
                kind: ConnectionEventKind::IceState(state),
            })
            .await;
    }

    pub async fn emit_candidate(&self, candidate: &str) {
        let _ = self
            .events
            .send(ConnectionEvent {
                peer_id: self.peer_id.clone(),
                epoch: self.epoch,
                kind: ConnectionEventKind::CandidateGenerated(IceCandidateInit {
                    candidate: candidate.to_string(),
                    sdp_mid: Some("0".to_string()),
                    sdp_m_line_index: Some(0),
                }),
            })
            .await;
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, NegotiationError> {
        if self.fail_offers {
            return Err(NegotiationError::CreateDescription(
                SdpKind::Offer,
                "scripted failure".to_string(),
            ));
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        self.offers.lock().unwrap().push(ice_restart);
        *self.state.lock().unwrap() = SignalingState::HaveLocalOffer;
        // Epoch in the SDP keeps redelivery detection from eating offers
        // published to the same path by a rebuilt connection.
        Ok(SessionDescription::offer(format!(
            "offer-{}-{}",
            self.epoch, n
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        self.answers.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = SignalingState::Stable;
        Ok(SessionDescription::answer(format!(
            "answer-{}-{}",
            self.epoch, n
        )))
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), NegotiationError> {
        *self.state.lock().unwrap() = match desc.kind {
            SdpKind::Offer => SignalingState::HaveRemoteOffer,
            _ => SignalingState::Stable,
        };
        self.applied.lock().unwrap().push(desc);
        Ok(())
    }

    async fn rollback_local(&self) -> Result<(), NegotiationError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_rollback {
            return Err(NegotiationError::RollbackFailed("unsupported".to_string()));
        }
        *self.state.lock().unwrap() = SignalingState::Stable;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<(), NegotiationError> {
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn add_track(&self, track: LocalTrack) -> Result<(), NegotiationError> {
        self.senders.lock().unwrap().insert(track.kind);
        Ok(())
    }

    async fn replace_track(
        &self,
        kind: TrackKind,
        track: Option<LocalTrack>,
    ) -> Result<bool, NegotiationError> {
        self.replacements
            .lock()
            .unwrap()
            .push((kind, track.as_ref().and_then(|t| t.device_id.clone())));
        if self.senders.lock().unwrap().contains(&kind) {
            return Ok(true);
        }
        match track {
            Some(track) => {
                self.add_track(track).await?;
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn signaling_state(&self) -> SignalingState {
        *self.state.lock().unwrap()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockTransportFactory {
    created: Mutex<Vec<Arc<MockTransport>>>,
    fail_rollback: AtomicBool,
    fail_offers: AtomicBool,
}

impl MockTransportFactory {
    pub fn set_fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_offers(&self, fail: bool) {
        self.fail_offers.store(fail, Ordering::SeqCst);
    }

    /// The most recent transport created toward `id`.
    pub fn for_peer(&self, id: &str) -> Option<Arc<MockTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|t| t.peer_id.as_str() == id)
            .cloned()
    }

    pub fn first_for(&self, id: &str) -> Option<Arc<MockTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.peer_id.as_str() == id)
            .cloned()
    }

    pub fn created_for(&self, id: &str) -> usize {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.peer_id.as_str() == id)
            .count()
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        peer_id: ParticipantId,
        epoch: u64,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn PeerTransport>, NegotiationError> {
        let transport = Arc::new(MockTransport {
            peer_id,
            epoch,
            events,
            fail_rollback: self.fail_rollback.load(Ordering::SeqCst),
            fail_offers: self.fail_offers.load(Ordering::SeqCst),
            state: Mutex::new(SignalingState::Stable),
            offers: Mutex::new(Vec::new()),
            answers: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
            applied: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            senders: Mutex::new(HashSet::new()),
            replacements: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        });
        self.created.lock().unwrap().push(transport.clone());
        Ok(transport)
    }
}
