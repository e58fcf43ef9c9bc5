//! Co-presence matching.
//!
//! Invoked after every presence upsert. Picks at most one partner — the
//! most recent eligible watcher of the same content — and derives the
//! stable pair key both sides will agree on.

use sha2::{Digest, Sha256};

use crosspath_common::StoreError;

use crate::presence::{PresenceDirectory, PresenceRecord};

/// Recency window for co-presence, one hour by default.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub max_age_ms: u64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 3_600_000,
        }
    }
}

pub struct Matcher {
    config: MatchConfig,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    /// The single partner for a freshly-updated presence record, if any.
    /// Selection stops at the first qualifying candidate — no fan-out.
    pub async fn find_partner(
        &self,
        directory: &PresenceDirectory,
        record: &PresenceRecord,
        now: u64,
    ) -> Result<Option<PresenceRecord>, StoreError> {
        let watchers = directory
            .find_watchers_of(&record.content_key, &record.user, now, self.config.max_age_ms)
            .await?;
        Ok(watchers.into_iter().next())
    }
}

/// Stable rendezvous identifier for a pair of sightings.
///
/// Order-independent digest over the two identities and their sighting
/// epochs, so whichever side discovers the other (or retries) derives the
/// identical key, with no dependence on which socket either side currently
/// holds. A later rendezvous between the same users gets fresh epochs and
/// therefore a fresh key.
pub fn pair_key(a: &PresenceRecord, b: &PresenceRecord) -> String {
    let (first, second) = if a.user <= b.user { (a, b) } else { (b, a) };

    let mut hasher = Sha256::new();
    hasher.update(first.user.as_bytes());
    hasher.update([0x1f]);
    hasher.update(second.user.as_bytes());
    hasher.update([0x1f]);
    hasher.update(first.sighted_at.to_be_bytes());
    hasher.update(second.sighted_at.to_be_bytes());

    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
