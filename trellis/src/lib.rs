//! Full-mesh WebRTC signaling and connection-lifecycle engine.
//!
//! A [`session::RoomSession`] turns a shared room roster into a mesh of
//! negotiated peer connections: it watches presence through a
//! [`signaling::SignalingRelay`], reconciles the roster against live
//! connections, drives per-peer offer/answer/ICE negotiation (including glare
//! recovery), and manages the local capture stream.

pub mod config;
pub mod media;
pub mod peer;
pub mod roster;
pub mod session;
pub mod signaling;
pub mod transport;

pub use config::{LocalIdentity, SessionConfig};
pub use session::{RoomSession, SessionBackends, SessionCommand, SessionEvent};
pub use trellis_core as core;
