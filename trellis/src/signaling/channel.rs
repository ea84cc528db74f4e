//! Typed, room-scoped view over the relay.
//!
//! The relay only offers full-snapshot subscriptions, so every write replays
//! the whole namespace. The channel turns that into one-shot message
//! semantics: each entry is fingerprinted and forwarded at most once, and
//! consumed entries stay remembered so their redelivery (or an identical
//! rewrite) is dropped instead of reprocessed.

use crate::signaling::relay::{RelaySnapshot, SignalingRelay};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;
use trellis_core::error::SignalingError;
use trellis_core::model::participant::{Participant, ParticipantId};
use trellis_core::model::room::RoomId;
use trellis_core::model::signaling::{IceCandidateInit, SessionDescription, paths};

#[derive(Debug, Clone)]
pub enum SignalEvent {
    /// Current room roster, delivered on every presence change.
    Presence(HashMap<ParticipantId, Participant>),
    Offer {
        from: ParticipantId,
        desc: SessionDescription,
        path: String,
    },
    Answer {
        from: ParticipantId,
        desc: SessionDescription,
        path: String,
    },
    Candidate {
        from: ParticipantId,
        candidate: IceCandidateInit,
        path: String,
    },
    Error(SignalingError),
}

pub struct SignalingChannel {
    relay: Arc<dyn SignalingRelay>,
    room: RoomId,
    local: ParticipantId,
    seen: Arc<DashMap<String, u64>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SignalingChannel {
    /// Publish our presence (with the crash-cleanup trigger) and start
    /// forwarding inbound signaling into `events`.
    pub async fn open(
        relay: Arc<dyn SignalingRelay>,
        room: RoomId,
        local: ParticipantId,
        display_name: String,
        events: mpsc::Sender<SignalEvent>,
    ) -> Result<Self, SignalingError> {
        let presence_path = paths::participant(&room, &local);
        relay.on_disconnect_delete(&presence_path).await?;

        let joined = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let participant = Participant {
            display_name,
            joined,
        };
        relay
            .put(&presence_path, encode(&presence_path, &participant)?)
            .await?;

        let seen: Arc<DashMap<String, u64>> = Arc::new(DashMap::new());
        let mut channel = Self {
            relay: relay.clone(),
            room: room.clone(),
            local: local.clone(),
            seen: seen.clone(),
            tasks: Vec::new(),
        };

        channel.spawn_presence_task(events.clone()).await?;
        channel
            .spawn_message_task(paths::offers(&room), MessageKind::Offer, events.clone())
            .await?;
        channel
            .spawn_message_task(paths::answers(&room), MessageKind::Answer, events.clone())
            .await?;
        channel
            .spawn_message_task(paths::candidates(&room), MessageKind::Candidate, events)
            .await?;

        Ok(channel)
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub async fn publish_offer(
        &self,
        to: &ParticipantId,
        desc: &SessionDescription,
    ) -> Result<(), SignalingError> {
        let path = paths::offer(&self.room, &self.local, to);
        self.relay.put(&path, encode(&path, desc)?).await
    }

    pub async fn publish_answer(
        &self,
        to: &ParticipantId,
        desc: &SessionDescription,
    ) -> Result<(), SignalingError> {
        let path = paths::answer(&self.room, &self.local, to);
        self.relay.put(&path, encode(&path, desc)?).await
    }

    pub async fn publish_candidate(
        &self,
        to: &ParticipantId,
        candidate: &IceCandidateInit,
    ) -> Result<(), SignalingError> {
        let path = paths::candidate_box(&self.room, &self.local, to);
        self.relay.push(&path, encode(&path, candidate)?).await?;
        Ok(())
    }

    /// Mark a delivered message processed: delete it from the relay. The
    /// fingerprint is kept so the deletion's own snapshot replay is inert.
    pub async fn consume(&self, path: &str) -> Result<(), SignalingError> {
        self.relay.delete(path).await
    }

    /// Graceful leave: stop forwarding, drop our presence entry and every
    /// message we still have in flight toward other participants.
    pub async fn close(mut self) -> Result<(), SignalingError> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.relay
            .delete(&paths::participant(&self.room, &self.local))
            .await?;
        for outbox in [
            format!("{}/{}", paths::offers(&self.room), self.local),
            format!("{}/{}", paths::answers(&self.room), self.local),
            format!("{}/{}", paths::candidates(&self.room), self.local),
        ] {
            self.relay.delete(&outbox).await?;
        }
        Ok(())
    }

    async fn spawn_presence_task(
        &mut self,
        events: mpsc::Sender<SignalEvent>,
    ) -> Result<(), SignalingError> {
        let prefix = paths::participants(&self.room);
        let mut sub = self.relay.subscribe(&prefix).await?;

        self.tasks.push(tokio::spawn(async move {
            while let Some(snapshot) = sub.rx.recv().await {
                let mut roster = HashMap::new();
                for (key, value) in snapshot {
                    match serde_json::from_value::<Participant>(value) {
                        Ok(participant) => {
                            roster.insert(ParticipantId::from(key), participant);
                        }
                        Err(e) => warn!("Malformed presence entry '{}': {}", key, e),
                    }
                }
                if events.send(SignalEvent::Presence(roster)).await.is_err() {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn spawn_message_task(
        &mut self,
        prefix: String,
        kind: MessageKind,
        events: mpsc::Sender<SignalEvent>,
    ) -> Result<(), SignalingError> {
        let mut sub = self.relay.subscribe(&prefix).await?;
        let local = self.local.clone();
        let seen = self.seen.clone();

        self.tasks.push(tokio::spawn(async move {
            while let Some(snapshot) = sub.rx.recv().await {
                for event in
                    extract_inbound(&prefix, kind, &local, &seen, snapshot)
                {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }));
        Ok(())
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageKind {
    Offer,
    Answer,
    Candidate,
}

fn encode<T: serde::Serialize>(path: &str, value: &T) -> Result<Value, SignalingError> {
    serde_json::to_value(value).map_err(|e| SignalingError::Publish {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn fingerprint(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    hasher.finish()
}

/// Pick out the entries addressed to us that we have not forwarded yet.
fn extract_inbound(
    prefix: &str,
    kind: MessageKind,
    local: &ParticipantId,
    seen: &DashMap<String, u64>,
    snapshot: RelaySnapshot,
) -> Vec<SignalEvent> {
    let mut out = Vec::new();

    for (key, value) in snapshot {
        // Keys are `{from}/{to}` for descriptions, `{from}/{to}/{pushId}`
        // for candidates.
        let mut parts = key.split('/');
        let (Some(from), Some(to)) = (parts.next(), parts.next()) else {
            continue;
        };
        if to != local.as_str() || from == local.as_str() {
            continue;
        }

        let path = format!("{prefix}/{key}");
        let fp = fingerprint(&value);
        if seen.get(&path).is_some_and(|prev| *prev == fp) {
            continue;
        }
        seen.insert(path.clone(), fp);

        let from = ParticipantId::from(from);
        let event = match kind {
            MessageKind::Offer | MessageKind::Answer => {
                match serde_json::from_value::<SessionDescription>(value) {
                    Ok(desc) => match kind {
                        MessageKind::Offer => SignalEvent::Offer { from, desc, path },
                        _ => SignalEvent::Answer { from, desc, path },
                    },
                    Err(e) => SignalEvent::Error(SignalingError::Malformed {
                        path,
                        reason: e.to_string(),
                    }),
                }
            }
            MessageKind::Candidate => {
                match serde_json::from_value::<IceCandidateInit>(value) {
                    Ok(candidate) => SignalEvent::Candidate {
                        from,
                        candidate,
                        path,
                    },
                    Err(e) => SignalEvent::Error(SignalingError::Malformed {
                        path,
                        reason: e.to_string(),
                    }),
                }
            }
        };
        out.push(event);
    }

    out
}
