pub mod manager;
pub mod peer;

pub use manager::{FollowUp, PeerManager};
pub use peer::{Connection, Peer, PeerSummary};
