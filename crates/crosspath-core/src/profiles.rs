//! User profile lookup and registration.
//!
//! Profiles enrich the final reunion payload and back the `register` /
//! `get_user` operations. The store stays behind a trait; the in-memory
//! implementation mirrors [`crate::store::MemoryStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crosspath_common::StoreError;

/// Display attributes attached to a reunion notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub gender: String,
    pub profile: String,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Create or overwrite a profile. Returns `true` if it was newly
    /// created, `false` if an existing one was updated.
    async fn upsert(&self, profile: UserProfile) -> Result<bool, StoreError>;
}

pub struct MemoryProfiles {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryProfiles {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn get(&self, name: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.profiles.read().await.get(name).cloned())
    }

    async fn upsert(&self, profile: UserProfile) -> Result<bool, StoreError> {
        let mut map = self.profiles.write().await;
        Ok(map.insert(profile.name.clone(), profile).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, gender: &str, about: &str) -> UserProfile {
        UserProfile {
            name: name.to_string(),
            gender: gender.to_string(),
            profile: about.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_reports_created_vs_updated() {
        let store = MemoryProfiles::new();
        assert!(store.upsert(profile("alice", "f", "hi")).await.unwrap());
        assert!(!store.upsert(profile("alice", "f", "hello")).await.unwrap());

        let stored = store.get("alice").await.unwrap().unwrap();
        assert_eq!(stored.profile, "hello");
    }

    #[tokio::test]
    async fn missing_profile_is_none() {
        let store = MemoryProfiles::new();
        assert!(store.get("nobody").await.unwrap().is_none());
    }
}
