use crate::model::participant::ParticipantId;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
    Rollback,
}

/// An SDP offer or answer as stored in the relay under
/// `rooms/{room}/offers/{from}/{to}` or `rooms/{room}/answers/{from}/{to}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Trickle-ICE candidate as published to
/// `rooms/{room}/candidates/{from}/{to}/{pushId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidateInit {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}

/// Relay path layout. Every signaling message lives in a room-scoped
/// namespace; offers and answers are keyed by the (from, to) pair, candidates
/// get an extra relay-generated child id per candidate.
pub mod paths {
    use super::*;

    pub fn room(room: &RoomId) -> String {
        format!("rooms/{room}")
    }

    pub fn participants(room: &RoomId) -> String {
        format!("rooms/{room}/participants")
    }

    pub fn participant(room: &RoomId, id: &ParticipantId) -> String {
        format!("rooms/{room}/participants/{id}")
    }

    pub fn offers(room: &RoomId) -> String {
        format!("rooms/{room}/offers")
    }

    pub fn offer(room: &RoomId, from: &ParticipantId, to: &ParticipantId) -> String {
        format!("rooms/{room}/offers/{from}/{to}")
    }

    pub fn answers(room: &RoomId) -> String {
        format!("rooms/{room}/answers")
    }

    pub fn answer(room: &RoomId, from: &ParticipantId, to: &ParticipantId) -> String {
        format!("rooms/{room}/answers/{from}/{to}")
    }

    pub fn candidates(room: &RoomId) -> String {
        format!("rooms/{room}/candidates")
    }

    pub fn candidate_box(room: &RoomId, from: &ParticipantId, to: &ParticipantId) -> String {
        format!("rooms/{room}/candidates/{from}/{to}")
    }
}
