use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one room participant. The string form is what the relay keys
/// presence and signaling messages by, and its lexicographic order is the
/// tie-break used when both sides of a connection offer at once.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presence entry as stored in the relay under `rooms/{room}/participants/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    #[serde(rename = "displayName")]
    pub display_name: String,
    /// Epoch millis at which the participant joined.
    pub joined: u64,
}
