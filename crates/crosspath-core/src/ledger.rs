//! Pairing ledger: the crash/reunion state machine.
//!
//! One entry per pair key, advanced by events arriving independently from
//! both participants. No lock guards the entry — every transition is
//! either idempotent or a versioned write, so a lost race is observed and
//! replayed rather than overwritten.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crosspath_common::{SessionId, StoreError};

use crate::presence::PresenceRecord;
use crate::store::RendezvousStore;

/// Stage of one rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStage {
    /// Co-presence detected; nobody has confirmed yet, or one side has and
    /// the entry still awaits promotion.
    Crashed,
    /// One participant confirmed and staged their answer.
    ReunionPending,
    ReunionConfirmed,
    ReunionRejected,
}

impl PairingStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PairingStage::ReunionConfirmed | PairingStage::ReunionRejected
        )
    }
}

/// One side of a pairing: identity plus the session handle it held when the
/// crash was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user: String,
    pub session: SessionId,
}

impl From<&PresenceRecord> for Participant {
    fn from(record: &PresenceRecord) -> Self {
        Self {
            user: record.user.clone(),
            session: record.session.clone(),
        }
    }
}

/// The two-sided pairing record. Never deleted; terminal entries stay
/// behind so duplicate events re-resolve to a no-pairing outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingEntry {
    pub pair_key: String,
    pub initiator: Participant,
    pub responder: Participant,
    pub stage: PairingStage,
    /// Who performed the Crashed → ReunionPending transition.
    pub confirmed_by: Option<String>,
    /// Secret staged by the first confirmer, compared on completion.
    pub pending_answer: Option<String>,
    pub updated_at: u64,
    /// Store-managed compare-and-swap token.
    pub version: u64,
}

impl PairingEntry {
    pub fn involves(&self, user: &str) -> bool {
        self.initiator.user == user || self.responder.user == user
    }

    pub fn participant(&self, user: &str) -> Option<&Participant> {
        if self.initiator.user == user {
            Some(&self.initiator)
        } else if self.responder.user == user {
            Some(&self.responder)
        } else {
            None
        }
    }

    pub fn peer_of(&self, user: &str) -> Option<&Participant> {
        if self.initiator.user == user {
            Some(&self.responder)
        } else if self.responder.user == user {
            Some(&self.initiator)
        } else {
            None
        }
    }
}

/// How the pending → terminal comparison treats answers (see DESIGN.md).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReunionPolicy {
    /// The completing answer must equal the staged one; both-absent counts
    /// as a match.
    #[default]
    SharedSecret,
    /// Both parties confirming is enough; answers are ignored.
    Unconditional,
}

/// Result of advancing the handshake for one participant's event.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// No live pairing names this user, or the newest one already
    /// completed.
    NoPairing,
    /// First confirmer recorded; the handshake now waits on the peer.
    Pending { peer: Participant },
    /// Duplicate confirm from the side that already confirmed.
    StillPending,
    Confirmed { caller: Participant, peer: Participant },
    Rejected { caller: Participant, peer: Participant },
}

pub struct PairingLedger {
    store: Arc<dyn RendezvousStore>,
    policy: ReunionPolicy,
}

impl PairingLedger {
    pub fn new(store: Arc<dyn RendezvousStore>, policy: ReunionPolicy) -> Self {
        Self { store, policy }
    }

    /// Record first detected co-presence under `pair_key`. Idempotent: the
    /// symmetric write from the other side, or a duplicate event, is
    /// absorbed without touching the existing entry's participant
    /// assignment.
    pub async fn record_crash(
        &self,
        pair_key: &str,
        caller: Participant,
        peer: Participant,
        now: u64,
    ) -> Result<PairingEntry, StoreError> {
        if let Some(existing) = self.store.get_pairing(pair_key).await? {
            return Ok(existing);
        }

        let entry = PairingEntry {
            pair_key: pair_key.to_string(),
            initiator: caller,
            responder: peer,
            stage: PairingStage::Crashed,
            confirmed_by: None,
            pending_answer: None,
            updated_at: now,
            version: 0,
        };
        match self.store.put_pairing(entry, None).await {
            Ok(stored) => Ok(stored),
            Err(StoreError::Conflict(_)) => {
                // Lost the create race to the other side's symmetric write.
                match self.store.get_pairing(pair_key).await? {
                    Some(existing) => Ok(existing),
                    None => Err(StoreError::Unavailable(format!(
                        "pairing {pair_key} vanished after create conflict"
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Advance the handshake for `user`'s confirm/finalize event. Retries
    /// the read-modify-write once if a concurrent writer got there first;
    /// the retry re-reads the entry, so a lost Crashed → ReunionPending
    /// race comes back as the completing comparison instead.
    pub async fn advance(
        &self,
        user: &str,
        answer: Option<&str>,
        now: u64,
    ) -> Result<AdvanceOutcome, StoreError> {
        match self.try_advance(user, answer, now).await {
            Err(StoreError::Conflict(_)) => match self.try_advance(user, answer, now).await {
                Err(StoreError::Conflict(detail)) => Err(StoreError::Unavailable(format!(
                    "pairing write kept conflicting: {detail}"
                ))),
                other => other,
            },
            other => other,
        }
    }

    async fn try_advance(
        &self,
        user: &str,
        answer: Option<&str>,
        now: u64,
    ) -> Result<AdvanceOutcome, StoreError> {
        let Some(mut entry) = self.store.pairing_for_user(user).await? else {
            return Ok(AdvanceOutcome::NoPairing);
        };
        let Some(caller) = entry.participant(user).cloned() else {
            return Ok(AdvanceOutcome::NoPairing);
        };
        let Some(peer) = entry.peer_of(user).cloned() else {
            return Ok(AdvanceOutcome::NoPairing);
        };

        match entry.stage {
            PairingStage::Crashed => {
                let expected = entry.version;
                entry.stage = PairingStage::ReunionPending;
                entry.confirmed_by = Some(user.to_string());
                entry.pending_answer = answer.map(str::to_string);
                entry.updated_at = now;
                self.store.put_pairing(entry, Some(expected)).await?;
                Ok(AdvanceOutcome::Pending { peer })
            }
            PairingStage::ReunionPending => {
                if entry.confirmed_by.as_deref() == Some(user) {
                    return Ok(AdvanceOutcome::StillPending);
                }
                let matched = match self.policy {
                    ReunionPolicy::SharedSecret => entry.pending_answer.as_deref() == answer,
                    ReunionPolicy::Unconditional => true,
                };
                let expected = entry.version;
                entry.stage = if matched {
                    PairingStage::ReunionConfirmed
                } else {
                    PairingStage::ReunionRejected
                };
                entry.updated_at = now;
                self.store.put_pairing(entry, Some(expected)).await?;
                if matched {
                    Ok(AdvanceOutcome::Confirmed { caller, peer })
                } else {
                    Ok(AdvanceOutcome::Rejected { caller, peer })
                }
            }
            PairingStage::ReunionConfirmed | PairingStage::ReunionRejected => {
                Ok(AdvanceOutcome::NoPairing)
            }
        }
    }
}
