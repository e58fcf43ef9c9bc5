//! Co-presence rendezvous engine.
//!
//! Pairs anonymous visitors watching the same content into a two-stage
//! rendezvous: a *crash* when co-presence is detected, then a confirmed
//! *reunion* once both parties opt in (optionally gated by a shared
//! secret). No lock serializes the two-sided pairing record — correctness
//! rests on idempotent transitions and versioned writes.

pub mod ledger;
pub mod matcher;
pub mod presence;
pub mod profiles;
pub mod protocol;
pub mod registry;
pub mod rendezvous;
pub mod store;

pub use ledger::{
    AdvanceOutcome, PairingEntry, PairingLedger, PairingStage, Participant, ReunionPolicy,
};
pub use matcher::{pair_key, MatchConfig, Matcher};
pub use presence::{PresenceDirectory, PresenceRecord, PresenceState};
pub use profiles::{MemoryProfiles, ProfileStore, UserProfile};
pub use protocol::ServerPush;
pub use registry::SessionRegistry;
pub use rendezvous::{RendezvousConfig, RendezvousManager};
pub use store::{MemoryStore, RendezvousStore};
