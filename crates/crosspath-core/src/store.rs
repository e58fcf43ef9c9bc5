//! Repository contract for the presence/pairing store, plus the in-memory
//! reference implementation.
//!
//! Every method is a suspension point; callers must not hold in-process
//! locks across them. Pairing writes are versioned compare-and-swap so two
//! event tasks mutating the same entry cannot silently overwrite each
//! other.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crosspath_common::StoreError;

use crate::ledger::PairingEntry;
use crate::presence::PresenceRecord;

#[async_trait]
pub trait RendezvousStore: Send + Sync {
    async fn get_presence(&self, user: &str) -> Result<Option<PresenceRecord>, StoreError>;

    /// Overwrite the user's presence record in place.
    async fn put_presence(&self, record: PresenceRecord) -> Result<(), StoreError>;

    /// All presence records for a content key except `exclude_user`'s,
    /// ordered by `observed_at` descending.
    async fn presence_by_content(
        &self,
        content_key: &str,
        exclude_user: &str,
    ) -> Result<Vec<PresenceRecord>, StoreError>;

    async fn get_pairing(&self, pair_key: &str) -> Result<Option<PairingEntry>, StoreError>;

    /// Versioned write. `expected_version: None` creates the entry and
    /// fails with [`StoreError::Conflict`] if one already exists;
    /// `Some(v)` replaces the entry only if its stored version is still
    /// `v`. Returns the stored entry with its version bumped.
    async fn put_pairing(
        &self,
        entry: PairingEntry,
        expected_version: Option<u64>,
    ) -> Result<PairingEntry, StoreError>;

    /// The most recently updated pairing naming `user` as either
    /// participant, regardless of stage.
    async fn pairing_for_user(&self, user: &str) -> Result<Option<PairingEntry>, StoreError>;
}

/// In-memory store. The single write lock per map makes each CAS atomic;
/// no lock is held across an await.
pub struct MemoryStore {
    presence: RwLock<HashMap<String, PresenceRecord>>,
    pairings: RwLock<HashMap<String, PairingEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            presence: RwLock::new(HashMap::new()),
            pairings: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RendezvousStore for MemoryStore {
    async fn get_presence(&self, user: &str) -> Result<Option<PresenceRecord>, StoreError> {
        Ok(self.presence.read().await.get(user).cloned())
    }

    async fn put_presence(&self, record: PresenceRecord) -> Result<(), StoreError> {
        self.presence
            .write()
            .await
            .insert(record.user.clone(), record);
        Ok(())
    }

    async fn presence_by_content(
        &self,
        content_key: &str,
        exclude_user: &str,
    ) -> Result<Vec<PresenceRecord>, StoreError> {
        let mut records: Vec<PresenceRecord> = self
            .presence
            .read()
            .await
            .values()
            .filter(|r| r.content_key == content_key && r.user != exclude_user)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        Ok(records)
    }

    async fn get_pairing(&self, pair_key: &str) -> Result<Option<PairingEntry>, StoreError> {
        Ok(self.pairings.read().await.get(pair_key).cloned())
    }

    async fn put_pairing(
        &self,
        mut entry: PairingEntry,
        expected_version: Option<u64>,
    ) -> Result<PairingEntry, StoreError> {
        let mut map = self.pairings.write().await;
        match (map.get(&entry.pair_key), expected_version) {
            (Some(_), None) => Err(StoreError::Conflict(format!(
                "pairing {} already exists",
                entry.pair_key
            ))),
            (None, Some(_)) => Err(StoreError::Conflict(format!(
                "pairing {} is gone",
                entry.pair_key
            ))),
            (Some(current), Some(v)) if current.version != v => Err(StoreError::Conflict(
                format!("pairing {} changed underneath us", entry.pair_key),
            )),
            _ => {
                entry.version = expected_version.map_or(1, |v| v + 1);
                map.insert(entry.pair_key.clone(), entry.clone());
                Ok(entry)
            }
        }
    }

    async fn pairing_for_user(&self, user: &str) -> Result<Option<PairingEntry>, StoreError> {
        Ok(self
            .pairings
            .read()
            .await
            .values()
            .filter(|e| e.involves(user))
            .max_by_key(|e| e.updated_at)
            .cloned())
    }
}
