pub mod channel;
pub mod memory;
pub mod relay;

pub use channel::{SignalEvent, SignalingChannel};
pub use memory::{InMemoryRelay, InMemoryRelayClient};
pub use relay::{RelaySnapshot, RelaySubscription, SignalingRelay};
