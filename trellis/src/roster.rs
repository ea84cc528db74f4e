//! Presence-to-connection reconciliation. Roster membership is the single
//! source of truth for which peer connections should exist; each snapshot is
//! diffed against the known peers in one synchronous pass.

use std::collections::{HashMap, HashSet};
use trellis_core::model::participant::{Participant, ParticipantId};

#[derive(Debug, Default)]
pub struct RosterDelta {
    pub added: Vec<(ParticipantId, Participant)>,
    pub removed: Vec<ParticipantId>,
}

pub fn diff<'a>(
    local: &ParticipantId,
    known: impl IntoIterator<Item = &'a ParticipantId>,
    snapshot: &HashMap<ParticipantId, Participant>,
) -> RosterDelta {
    let known: HashSet<&ParticipantId> = known.into_iter().collect();
    let mut delta = RosterDelta::default();

    for (id, participant) in snapshot {
        if id != local && !known.contains(id) {
            delta.added.push((id.clone(), participant.clone()));
        }
    }
    for id in known {
        if !snapshot.contains_key(id) {
            delta.removed.push(id.clone());
        }
    }

    // Stable order keeps reconciliation logs and tests deterministic.
    delta.added.sort_by(|a, b| a.0.cmp(&b.0));
    delta.removed.sort();
    delta
}
