use std::time::Duration;
use trellis_core::model::participant::ParticipantId;
use trellis_core::model::signaling::IceServerConfig;

/// Who we are, as provided by the identity collaborator.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub id: ParticipantId,
    pub display_name: String,
}

impl LocalIdentity {
    pub fn new(id: impl Into<ParticipantId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// Bound on join attempts before giving up with a hard error.
    pub join_retry_limit: u32,
    pub join_retry_delay: Duration,
    /// Delay before the single ICE restart attempted after `disconnected`.
    pub ice_restart_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig::stun("stun:stun.l.google.com:19302")],
            join_retry_limit: 3,
            join_retry_delay: Duration::from_millis(250),
            ice_restart_delay: Duration::from_secs(2),
        }
    }
}
