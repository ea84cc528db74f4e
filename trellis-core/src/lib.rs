pub mod error;
pub mod model;
pub mod negotiation;
pub mod status;

pub use error::{
    ConnectivityError, JoinError, MediaError, NegotiationError, SignalingError, TrellisError,
};
pub use model::participant::{Participant, ParticipantId};
pub use model::room::RoomId;
pub use model::signaling::{
    IceCandidateInit, IceServerConfig, SdpKind, SessionDescription, paths,
};
pub use negotiation::{Negotiation, NegotiationCommand, NegotiationEvent, NegotiationState};
pub use status::{ConnectionStatus, IceConnectionState, SignalingState, aggregate_status};
