//! Session registry: maps live session handles to push channels.
//!
//! Delivery is best-effort and at-most-once. An unknown handle or a closed
//! channel is logged and swallowed — the other party never learns about a
//! failed delivery.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crosspath_common::SessionId;

use crate::protocol::ServerPush;

/// Thread-safe handle → channel map shared by all event tasks.
#[derive(Clone)]
pub struct SessionRegistry {
    channels: Arc<RwLock<HashMap<SessionId, mpsc::Sender<ServerPush>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a session's push channel. A reconnect under the same handle
    /// replaces the previous channel.
    pub async fn register(&self, session: SessionId, tx: mpsc::Sender<ServerPush>) {
        self.channels.write().await.insert(session, tx);
    }

    /// Remove a session on disconnect.
    pub async fn unregister(&self, session: &SessionId) {
        self.channels.write().await.remove(session);
    }

    /// Push an event to one session. Returns whether the push was handed to
    /// a live channel; `false` is not an error.
    pub async fn push(&self, session: &SessionId, push: ServerPush) -> bool {
        let tx = { self.channels.read().await.get(session).cloned() };
        let Some(tx) = tx else {
            tracing::debug!(session = %session, kind = push.kind(), "push to unknown session dropped");
            return false;
        };
        if tx.send(push).await.is_err() {
            tracing::debug!(session = %session, "push channel closed");
            return false;
        }
        true
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_reaches_registered_session() {
        let registry = SessionRegistry::new();
        let session = SessionId::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(session.clone(), tx).await;

        let delivered = registry
            .push(&session, ServerPush::Message { text: "hi".into() })
            .await;
        assert!(delivered);
        assert_eq!(rx.recv().await, Some(ServerPush::Message { text: "hi".into() }));
    }

    #[tokio::test]
    async fn push_to_unknown_session_fails_silently() {
        let registry = SessionRegistry::new();
        let delivered = registry
            .push(&SessionId::new(), ServerPush::Message { text: "hi".into() })
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn unregister_drops_the_channel() {
        let registry = SessionRegistry::new();
        let session = SessionId::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.register(session.clone(), tx).await;
        assert_eq!(registry.count().await, 1);

        registry.unregister(&session).await;
        assert_eq!(registry.count().await, 0);
        assert!(
            !registry
                .push(&session, ServerPush::Message { text: "hi".into() })
                .await
        );
    }
}
