//! Per-peer negotiation protocol as a pure state machine.
//!
//! Each transition takes an event and returns the side-effect commands the
//! connection manager must run against the transport and the signaling
//! channel. Keeping the protocol free of I/O makes glare resolution and the
//! recovery paths unit-testable without a network.

use crate::model::participant::ParticipantId;
use crate::model::signaling::{IceCandidateInit, SessionDescription};
use crate::status::IceConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Fresh connection, nothing negotiated yet.
    Idle,
    /// Local offer published, waiting for the remote answer.
    OfferPending,
    /// Offer/answer exchange complete.
    Stable,
    /// Both sides offered at once; rolling back the losing offer.
    GlareDetected,
    /// Unrecoverable transition; the connection is being torn down and
    /// rebuilt from scratch.
    Recreating,
    Closed,
}

#[derive(Debug, Clone)]
pub enum NegotiationEvent {
    /// A track was added or removed and the session needs (re)negotiation.
    NegotiationNeeded,
    /// The `CreateOffer` command completed and the offer was published.
    OfferSent,
    OfferFailed(String),
    RemoteOffer(SessionDescription),
    RemoteAnswer(SessionDescription),
    RemoteCandidate(IceCandidateInit),
    /// A remote description (offer or answer) was applied to the transport.
    RemoteDescriptionApplied,
    ApplyFailed(String),
    RollbackFailed(String),
    IceState(IceConnectionState),
    /// The delayed ICE-restart timer fired.
    IceRestartDue,
    ConnectionClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationCommand {
    /// Create an offer, set it as local description, publish it.
    CreateOffer { ice_restart: bool },
    /// Apply the remote offer, create and publish an answer.
    AcceptOffer(SessionDescription),
    /// Roll back our own pending offer, then accept the remote one.
    RollbackAndAccept(SessionDescription),
    /// Apply the remote answer to our pending offer.
    ApplyAnswer(SessionDescription),
    ApplyCandidate(IceCandidateInit),
    /// Arm the one-shot delayed ICE restart.
    ScheduleIceRestart,
    /// Tear the connection down and build a new one.
    RecreateConnection,
    /// Drop the event, log only.
    Ignore(&'static str),
}

#[derive(Debug)]
pub struct Negotiation {
    local: ParticipantId,
    remote: ParticipantId,
    initiator: bool,
    state: NegotiationState,
    /// Candidates received before a remote description was applied.
    pending_candidates: Vec<IceCandidateInit>,
    has_remote_description: bool,
    /// Renegotiation requested while one was already in flight.
    renegotiate_after_stable: bool,
    ice_restart_attempted: bool,
    restart_scheduled: bool,
    last_ice: IceConnectionState,
}

impl Negotiation {
    pub fn new(local: ParticipantId, remote: ParticipantId, initiator: bool) -> Self {
        Self {
            local,
            remote,
            initiator,
            state: NegotiationState::Idle,
            pending_candidates: Vec::new(),
            has_remote_description: false,
            renegotiate_after_stable: false,
            ice_restart_attempted: false,
            restart_scheduled: false,
            last_ice: IceConnectionState::New,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn initiator(&self) -> bool {
        self.initiator
    }

    /// The deterministic glare tie-break: the lexicographically greater
    /// participant id's offer wins. Both sides must apply the identical rule
    /// or the mesh can deadlock in mutual have-local-offer.
    fn remote_offer_wins(&self) -> bool {
        self.remote > self.local
    }

    pub fn handle(&mut self, event: NegotiationEvent) -> Vec<NegotiationCommand> {
        use NegotiationCommand as Cmd;
        use NegotiationEvent as Ev;
        use NegotiationState as St;

        if self.state == St::Closed {
            return match event {
                Ev::ConnectionClosed => vec![],
                _ => vec![Cmd::Ignore("connection closed")],
            };
        }

        match event {
            Ev::NegotiationNeeded => match self.state {
                St::Idle if !self.initiator => vec![],
                St::Idle | St::Stable => {
                    self.state = St::OfferPending;
                    vec![Cmd::CreateOffer { ice_restart: false }]
                }
                _ => {
                    self.renegotiate_after_stable = true;
                    vec![]
                }
            },

            Ev::OfferSent => vec![],

            Ev::OfferFailed(_) | Ev::ApplyFailed(_) | Ev::RollbackFailed(_) => {
                self.state = St::Recreating;
                vec![Cmd::RecreateConnection]
            }

            Ev::RemoteOffer(desc) => match self.state {
                St::Idle | St::Stable => vec![Cmd::AcceptOffer(desc)],
                St::OfferPending => {
                    if self.remote_offer_wins() {
                        self.state = St::GlareDetected;
                        vec![Cmd::RollbackAndAccept(desc)]
                    } else {
                        vec![Cmd::Ignore("glare: local offer wins, expecting rollback")]
                    }
                }
                St::GlareDetected | St::Recreating => {
                    vec![Cmd::Ignore("offer during recovery")]
                }
                St::Closed => unreachable!(),
            },

            Ev::RemoteAnswer(desc) => match self.state {
                St::OfferPending => vec![Cmd::ApplyAnswer(desc)],
                _ => vec![Cmd::Ignore("stale answer")],
            },

            Ev::RemoteCandidate(candidate) => {
                if self.has_remote_description {
                    vec![Cmd::ApplyCandidate(candidate)]
                } else {
                    self.pending_candidates.push(candidate);
                    vec![]
                }
            }

            Ev::RemoteDescriptionApplied => {
                self.has_remote_description = true;
                self.state = St::Stable;
                let mut cmds: Vec<Cmd> = self
                    .pending_candidates
                    .drain(..)
                    .map(Cmd::ApplyCandidate)
                    .collect();
                if self.renegotiate_after_stable {
                    self.renegotiate_after_stable = false;
                    self.state = St::OfferPending;
                    cmds.push(Cmd::CreateOffer { ice_restart: false });
                }
                cmds
            }

            Ev::IceState(ice) => {
                self.last_ice = ice;
                match ice {
                    IceConnectionState::Connected | IceConnectionState::Completed => {
                        self.ice_restart_attempted = false;
                        vec![]
                    }
                    IceConnectionState::Failed => {
                        if self.ice_restart_attempted {
                            self.state = St::Recreating;
                            vec![Cmd::RecreateConnection]
                        } else {
                            self.ice_restart_attempted = true;
                            self.state = St::OfferPending;
                            vec![Cmd::CreateOffer { ice_restart: true }]
                        }
                    }
                    IceConnectionState::Disconnected => {
                        if self.restart_scheduled {
                            vec![]
                        } else {
                            self.restart_scheduled = true;
                            vec![Cmd::ScheduleIceRestart]
                        }
                    }
                    _ => vec![],
                }
            }

            Ev::IceRestartDue => {
                self.restart_scheduled = false;
                if self.last_ice == IceConnectionState::Disconnected {
                    self.ice_restart_attempted = true;
                    self.state = St::OfferPending;
                    vec![Cmd::CreateOffer { ice_restart: true }]
                } else {
                    vec![]
                }
            }

            Ev::ConnectionClosed => {
                self.state = St::Closed;
                vec![]
            }
        }
    }
}
