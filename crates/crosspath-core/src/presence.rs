//! Presence directory: who is watching what, right now.
//!
//! One record per user, overwritten in place by that user's own events.
//! Staleness is never reaped; it is evaluated on the read path against the
//! recency window.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crosspath_common::{SessionId, StoreError};

use crate::store::RendezvousStore;

/// Lifecycle of a presence record. A record only exists while its user is
/// watching something, so there is a single state today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    #[default]
    Watching,
}

/// One user's current sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user: String,
    /// Opaque hash of the watched resource.
    pub content_key: String,
    /// Live connection handle at the time of the last upsert. Best-effort:
    /// if it has gone stale, delivery just fails.
    pub session: SessionId,
    /// Last time the user reported this sighting (epoch ms).
    pub observed_at: u64,
    /// First time the user was seen on the current content key (epoch ms).
    /// Preserved across same-content upserts; pair keys are derived from it
    /// so both sides of a rendezvous agree on its identity.
    pub sighted_at: u64,
    pub state: PresenceState,
}

/// Read/write facade over the store's presence records.
pub struct PresenceDirectory {
    store: Arc<dyn RendezvousStore>,
}

impl PresenceDirectory {
    pub fn new(store: Arc<dyn RendezvousStore>) -> Self {
        Self { store }
    }

    /// Record what `user` is watching. Idempotent: repeated calls overwrite
    /// the content key, session handle and timestamp in place.
    pub async fn upsert(
        &self,
        user: &str,
        content_key: &str,
        session: SessionId,
        now: u64,
    ) -> Result<PresenceRecord, StoreError> {
        let previous = self.store.get_presence(user).await?;
        let sighted_at = match &previous {
            Some(prev) if prev.content_key == content_key => prev.sighted_at,
            _ => now,
        };

        let record = PresenceRecord {
            user: user.to_string(),
            content_key: content_key.to_string(),
            session,
            observed_at: now,
            sighted_at,
            state: PresenceState::Watching,
        };
        self.store.put_presence(record.clone()).await?;
        Ok(record)
    }

    /// Watchers of `content_key` other than `exclude_user`, newest first.
    /// The scan stops at the first record older than `max_age_ms`: the
    /// candidates arrive sorted by `observed_at` descending, so nothing
    /// past the first stale record can be fresh.
    pub async fn find_watchers_of(
        &self,
        content_key: &str,
        exclude_user: &str,
        now: u64,
        max_age_ms: u64,
    ) -> Result<Vec<PresenceRecord>, StoreError> {
        let candidates = self
            .store
            .presence_by_content(content_key, exclude_user)
            .await?;

        let mut fresh = Vec::new();
        for record in candidates {
            if record.user == exclude_user {
                continue;
            }
            if now.saturating_sub(record.observed_at) > max_age_ms {
                break;
            }
            fresh.push(record);
        }
        Ok(fresh)
    }
}
