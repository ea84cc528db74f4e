pub mod mock_media;
pub mod mock_transport;

pub use mock_media::MockMediaSource;
pub use mock_transport::{MockTransport, MockTransportFactory};
