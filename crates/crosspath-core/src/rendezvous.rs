//! Rendezvous orchestrator: the per-event entry point.
//!
//! Each inbound event runs in its own task, sequences the directory,
//! matcher and ledger, and ends in pushes through the session registry.
//! Failures never cross this boundary — every event resolves to exactly
//! one of success, no-match or error notification for its originator.

use std::sync::Arc;

use crosspath_common::{SessionId, StoreError};

use crate::ledger::{AdvanceOutcome, PairingLedger, Participant, ReunionPolicy};
use crate::matcher::{pair_key, MatchConfig, Matcher};
use crate::presence::PresenceDirectory;
use crate::profiles::{ProfileStore, UserProfile};
use crate::protocol::ServerPush;
use crate::registry::SessionRegistry;
use crate::store::RendezvousStore;

#[derive(Debug, Clone, Default)]
pub struct RendezvousConfig {
    pub matching: MatchConfig,
    pub reunion: ReunionPolicy,
}

pub struct RendezvousManager {
    registry: SessionRegistry,
    directory: PresenceDirectory,
    matcher: Matcher,
    ledger: PairingLedger,
    profiles: Arc<dyn ProfileStore>,
}

impl RendezvousManager {
    pub fn new(
        config: RendezvousConfig,
        store: Arc<dyn RendezvousStore>,
        profiles: Arc<dyn ProfileStore>,
        registry: SessionRegistry,
    ) -> Self {
        Self {
            registry,
            directory: PresenceDirectory::new(Arc::clone(&store)),
            matcher: Matcher::new(config.matching),
            ledger: PairingLedger::new(store, config.reunion),
            profiles,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Record what `user` is watching and look for a co-present partner.
    pub async fn watch(&self, user: &str, content_key: &str, session: &SessionId, now: u64) {
        if let Err(e) = self.try_watch(user, content_key, session, now).await {
            self.report_error(session, &e).await;
        }
    }

    async fn try_watch(
        &self,
        user: &str,
        content_key: &str,
        session: &SessionId,
        now: u64,
    ) -> Result<(), StoreError> {
        let record = self
            .directory
            .upsert(user, content_key, session.clone(), now)
            .await?;
        tracing::debug!(user, content_key, "presence updated");

        let Some(partner) = self.matcher.find_partner(&self.directory, &record, now).await? else {
            self.registry
                .push(
                    session,
                    ServerPush::Message {
                        text: format!("watching:{content_key}"),
                    },
                )
                .await;
            return Ok(());
        };

        let key = pair_key(&record, &partner);
        tracing::info!(user, partner = %partner.user, content_key, "co-presence detected");
        self.ledger
            .record_crash(
                &key,
                Participant::from(&record),
                Participant::from(&partner),
                now,
            )
            .await?;

        self.registry
            .push(
                session,
                ServerPush::Crash {
                    text: "crash!!".into(),
                },
            )
            .await;
        if !self
            .registry
            .push(
                &partner.session,
                ServerPush::Crashed {
                    text: "crashed!!".into(),
                },
            )
            .await
        {
            tracing::warn!(partner = %partner.user, "crashed push undeliverable");
        }
        Ok(())
    }

    /// First opt-in after a crash.
    pub async fn confirm(&self, user: &str, answer: Option<String>, session: &SessionId, now: u64) {
        let miss = ServerPush::NoCrash {
            text: "too bad".into(),
        };
        self.advance_and_notify(user, answer, session, now, miss)
            .await;
    }

    /// Completing opt-in, carrying the answer to compare.
    pub async fn finalize(&self, user: &str, answer: Option<String>, session: &SessionId, now: u64) {
        let miss = ServerPush::NoReunion {
            text: "too bad".into(),
        };
        self.advance_and_notify(user, answer, session, now, miss)
            .await;
    }

    async fn advance_and_notify(
        &self,
        user: &str,
        answer: Option<String>,
        session: &SessionId,
        now: u64,
        miss: ServerPush,
    ) {
        match self.ledger.advance(user, answer.as_deref(), now).await {
            Ok(AdvanceOutcome::NoPairing) => {
                self.registry.push(session, miss).await;
            }
            Ok(AdvanceOutcome::Pending { peer }) => {
                tracing::info!(user, peer = %peer.user, "reunion pending");
                self.registry
                    .push(
                        session,
                        ServerPush::Crash {
                            text: "reunion!!".into(),
                        },
                    )
                    .await;
                self.registry
                    .push(
                        &peer.session,
                        ServerPush::Crashed {
                            text: "reunioned!!".into(),
                        },
                    )
                    .await;
            }
            Ok(AdvanceOutcome::StillPending) => {
                self.registry
                    .push(
                        session,
                        ServerPush::Message {
                            text: "confirm:waiting".into(),
                        },
                    )
                    .await;
            }
            Ok(AdvanceOutcome::Confirmed { caller, peer }) => {
                tracing::info!(user = %caller.user, peer = %peer.user, "reunion confirmed");
                self.deliver_reunion(session, &caller, &peer).await;
            }
            Ok(AdvanceOutcome::Rejected { caller: _, peer }) => {
                tracing::info!(user, peer = %peer.user, "reunion rejected");
                self.registry
                    .push(
                        session,
                        ServerPush::NoReunion {
                            text: "too bad".into(),
                        },
                    )
                    .await;
                self.registry
                    .push(
                        &peer.session,
                        ServerPush::NoReunion {
                            text: "too bad".into(),
                        },
                    )
                    .await;
            }
            Err(e) => self.report_error(session, &e).await,
        }
    }

    /// Each side of a confirmed reunion receives the PEER's profile. The
    /// transition is already committed; a failure here degrades only the
    /// affected push.
    async fn deliver_reunion(&self, session: &SessionId, caller: &Participant, peer: &Participant) {
        match self.profiles.get(&peer.user).await {
            Ok(Some(p)) => {
                self.registry
                    .push(
                        session,
                        ServerPush::Reunion {
                            text: "reunion!!".into(),
                            profile: p.profile,
                            gender: p.gender,
                        },
                    )
                    .await;
            }
            Ok(None) => {
                self.registry
                    .push(
                        session,
                        ServerPush::Error {
                            text: format!("error:no profile for {}", peer.user),
                        },
                    )
                    .await;
            }
            Err(e) => self.report_error(session, &e).await,
        }

        match self.profiles.get(&caller.user).await {
            Ok(Some(p)) => {
                self.registry
                    .push(
                        &peer.session,
                        ServerPush::Reunion {
                            text: "reunion!!".into(),
                            profile: p.profile,
                            gender: p.gender,
                        },
                    )
                    .await;
            }
            Ok(None) => {
                tracing::warn!(user = %caller.user, "profile missing, peer reunion push dropped");
            }
            Err(e) => {
                tracing::warn!(error = %e, "profile lookup failed, peer reunion push dropped");
            }
        }
    }

    /// Create or update a user profile.
    pub async fn register_user(
        &self,
        name: &str,
        gender: &str,
        profile: &str,
        session: &SessionId,
    ) {
        let record = UserProfile {
            name: name.to_string(),
            gender: gender.to_string(),
            profile: profile.to_string(),
        };
        match self.profiles.upsert(record).await {
            Ok(created) => {
                let prefix = if created { "regist" } else { "update" };
                tracing::info!(name, created, "profile upserted");
                self.registry
                    .push(
                        session,
                        ServerPush::Message {
                            text: format!("{prefix}:{name}"),
                        },
                    )
                    .await;
            }
            Err(e) => self.report_error(session, &e).await,
        }
    }

    /// Report whether a profile exists.
    pub async fn get_user(&self, name: &str, session: &SessionId) {
        match self.profiles.get(name).await {
            Ok(Some(p)) => {
                self.registry
                    .push(
                        session,
                        ServerPush::Message {
                            text: format!("get_user:{}", p.name),
                        },
                    )
                    .await;
            }
            Ok(None) => {
                self.registry
                    .push(
                        session,
                        ServerPush::Message {
                            text: "get_user:not found".into(),
                        },
                    )
                    .await;
            }
            Err(e) => self.report_error(session, &e).await,
        }
    }

    async fn report_error(&self, session: &SessionId, err: &StoreError) {
        tracing::warn!(error = %err, "rendezvous operation failed");
        self.registry
            .push(
                session,
                ServerPush::Error {
                    text: format!("error:{err}"),
                },
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PairingEntry;
    use crate::presence::PresenceRecord;
    use crate::profiles::MemoryProfiles;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Harness {
        manager: RendezvousManager,
        store: Arc<MemoryStore>,
    }

    async fn harness(config: RendezvousConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let profiles = Arc::new(MemoryProfiles::new());
        profiles
            .upsert(UserProfile {
                name: "alice".into(),
                gender: "f".into(),
                profile: "likes toast".into(),
            })
            .await
            .unwrap();
        profiles
            .upsert(UserProfile {
                name: "bob".into(),
                gender: "m".into(),
                profile: "always late".into(),
            })
            .await
            .unwrap();

        let manager = RendezvousManager::new(
            config,
            store.clone() as Arc<dyn RendezvousStore>,
            profiles,
            SessionRegistry::new(),
        );
        Harness { manager, store }
    }

    async fn connect(
        manager: &RendezvousManager,
    ) -> (SessionId, mpsc::Receiver<ServerPush>) {
        let session = SessionId::new();
        let (tx, rx) = mpsc::channel(16);
        manager.registry().register(session.clone(), tx).await;
        (session, rx)
    }

    #[tokio::test]
    async fn watch_without_company_acks_only() {
        let h = harness(RendezvousConfig::default()).await;
        let (session, mut rx) = connect(&h.manager).await;

        h.manager.watch("alice", "page:7", &session, 1_000).await;
        assert_eq!(
            rx.recv().await,
            Some(ServerPush::Message {
                text: "watching:page:7".into()
            })
        );
    }

    #[tokio::test]
    async fn full_rendezvous_scenario() {
        let h = harness(RendezvousConfig::default()).await;
        let (alice, mut alice_rx) = connect(&h.manager).await;
        let (bob, mut bob_rx) = connect(&h.manager).await;
        let t0 = 1_000;

        // Alice watches alone.
        h.manager.watch("alice", "page:7", &alice, t0).await;
        assert_eq!(
            alice_rx.recv().await.unwrap().kind(),
            "message"
        );

        // Bob arrives five seconds later and discovers her.
        h.manager.watch("bob", "page:7", &bob, t0 + 5_000).await;
        assert_eq!(
            bob_rx.recv().await,
            Some(ServerPush::Crash {
                text: "crash!!".into()
            })
        );
        assert_eq!(
            alice_rx.recv().await,
            Some(ServerPush::Crashed {
                text: "crashed!!".into()
            })
        );

        // Alice confirms first, staging the answer.
        h.manager
            .confirm("alice", Some("x".into()), &alice, t0 + 10_000)
            .await;
        assert_eq!(alice_rx.recv().await.unwrap().kind(), "crash");
        assert_eq!(bob_rx.recv().await.unwrap().kind(), "crashed");

        // Bob finalizes with the matching answer; both get the peer's
        // profile.
        h.manager
            .finalize("bob", Some("x".into()), &bob, t0 + 20_000)
            .await;
        assert_eq!(
            bob_rx.recv().await,
            Some(ServerPush::Reunion {
                text: "reunion!!".into(),
                profile: "likes toast".into(),
                gender: "f".into(),
            })
        );
        assert_eq!(
            alice_rx.recv().await,
            Some(ServerPush::Reunion {
                text: "reunion!!".into(),
                profile: "always late".into(),
                gender: "m".into(),
            })
        );
    }

    #[tokio::test]
    async fn mismatched_answers_notify_both_of_failure() {
        let h = harness(RendezvousConfig::default()).await;
        let (alice, mut alice_rx) = connect(&h.manager).await;
        let (bob, mut bob_rx) = connect(&h.manager).await;

        h.manager.watch("alice", "page:7", &alice, 1_000).await;
        h.manager.watch("bob", "page:7", &bob, 2_000).await;
        h.manager
            .confirm("alice", Some("x".into()), &alice, 3_000)
            .await;
        h.manager
            .finalize("bob", Some("y".into()), &bob, 4_000)
            .await;

        // Drain up to the terminal notifications.
        let mut last_alice = None;
        while let Ok(push) = alice_rx.try_recv() {
            last_alice = Some(push);
        }
        let mut last_bob = None;
        while let Ok(push) = bob_rx.try_recv() {
            last_bob = Some(push);
        }
        assert_eq!(last_alice.unwrap().kind(), "noreunion");
        assert_eq!(last_bob.unwrap().kind(), "noreunion");
    }

    #[tokio::test]
    async fn finalize_without_pairing_is_noreunion_and_mutates_nothing() {
        let h = harness(RendezvousConfig::default()).await;
        let (session, mut rx) = connect(&h.manager).await;

        h.manager.finalize("alice", None, &session, 1_000).await;
        assert_eq!(
            rx.recv().await,
            Some(ServerPush::NoReunion {
                text: "too bad".into()
            })
        );
        assert!(h.store.pairing_for_user("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn confirm_without_pairing_is_nocrash() {
        let h = harness(RendezvousConfig::default()).await;
        let (session, mut rx) = connect(&h.manager).await;

        h.manager.confirm("alice", None, &session, 1_000).await;
        assert_eq!(rx.recv().await.unwrap().kind(), "nocrash");
    }

    #[tokio::test]
    async fn register_and_lookup_round_trip() {
        let h = harness(RendezvousConfig::default()).await;
        let (session, mut rx) = connect(&h.manager).await;

        h.manager
            .register_user("carol", "f", "new in town", &session)
            .await;
        assert_eq!(
            rx.recv().await,
            Some(ServerPush::Message {
                text: "regist:carol".into()
            })
        );

        h.manager
            .register_user("carol", "f", "settled in", &session)
            .await;
        assert_eq!(
            rx.recv().await,
            Some(ServerPush::Message {
                text: "update:carol".into()
            })
        );

        h.manager.get_user("carol", &session).await;
        assert_eq!(
            rx.recv().await,
            Some(ServerPush::Message {
                text: "get_user:carol".into()
            })
        );

        h.manager.get_user("mallory", &session).await;
        assert_eq!(
            rx.recv().await,
            Some(ServerPush::Message {
                text: "get_user:not found".into()
            })
        );
    }

    struct BrokenStore;

    #[async_trait]
    impl RendezvousStore for BrokenStore {
        async fn get_presence(&self, _: &str) -> Result<Option<PresenceRecord>, StoreError> {
            Err(StoreError::Unavailable("down for maintenance".into()))
        }
        async fn put_presence(&self, _: PresenceRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down for maintenance".into()))
        }
        async fn presence_by_content(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Vec<PresenceRecord>, StoreError> {
            Err(StoreError::Unavailable("down for maintenance".into()))
        }
        async fn get_pairing(&self, _: &str) -> Result<Option<PairingEntry>, StoreError> {
            Err(StoreError::Unavailable("down for maintenance".into()))
        }
        async fn put_pairing(
            &self,
            _: PairingEntry,
            _: Option<u64>,
        ) -> Result<PairingEntry, StoreError> {
            Err(StoreError::Unavailable("down for maintenance".into()))
        }
        async fn pairing_for_user(&self, _: &str) -> Result<Option<PairingEntry>, StoreError> {
            Err(StoreError::Unavailable("down for maintenance".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_becomes_a_single_error_push() {
        let manager = RendezvousManager::new(
            RendezvousConfig::default(),
            Arc::new(BrokenStore),
            Arc::new(MemoryProfiles::new()),
            SessionRegistry::new(),
        );
        let (session, mut rx) = connect(&manager).await;

        manager.watch("alice", "page:7", &session, 1_000).await;
        let push = rx.recv().await.unwrap();
        assert_eq!(push.kind(), "error");
        assert!(rx.try_recv().is_err());
    }
}
