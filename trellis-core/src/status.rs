use serde::{Deserialize, Serialize};

/// Mirror of the transport's signaling state. Offer creation is only valid
/// from `Stable`; applying a remote description must match the expected state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Aggregate health across all live connections, as shown on the status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// `Connected` if any connection reached connected/completed; `Failed` or
/// `Disconnected` only when every connection shares that state; `Connecting`
/// otherwise (including an empty set).
pub fn aggregate_status<I>(states: I) -> ConnectionStatus
where
    I: IntoIterator<Item = IceConnectionState>,
{
    let mut any = false;
    let mut all_failed = true;
    let mut all_disconnected = true;

    for state in states {
        any = true;
        match state {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                return ConnectionStatus::Connected;
            }
            IceConnectionState::Failed => all_disconnected = false,
            IceConnectionState::Disconnected => all_failed = false,
            _ => {
                all_failed = false;
                all_disconnected = false;
            }
        }
    }

    if !any {
        ConnectionStatus::Connecting
    } else if all_failed {
        ConnectionStatus::Failed
    } else if all_disconnected {
        ConnectionStatus::Disconnected
    } else {
        ConnectionStatus::Connecting
    }
}
