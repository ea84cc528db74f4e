pub mod event;
pub mod peer_transport;
pub mod rtc;

pub use event::{ConnectionEvent, ConnectionEventKind};
pub use peer_transport::{PeerTransport, TransportFactory};
pub use rtc::{RtcTransport, RtcTransportFactory};
