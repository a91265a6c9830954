//! In-memory session store: fast, non-persistent, for tests and one-shot runs.

use async_trait::async_trait;
use pincer_core::error::SessionError;
use pincer_core::message::Message;
use pincer_core::session::{Session, SessionKey, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sessions held in a map keyed by the namespaced session key.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing sessions.
    pub fn with_sessions(sessions: impl IntoIterator<Item = Session>) -> Self {
        let map = sessions.into_iter().map(|s| (s.key.clone(), s)).collect();
        Self {
            sessions: Arc::new(RwLock::new(map)),
        }
    }

    /// A copy of one session, if it exists.
    pub async fn snapshot(&self, key: &SessionKey) -> Option<Session> {
        self.sessions.read().await.get(&key.namespaced()).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Run `f` against the session for `key`, creating it if needed.
    pub(crate) async fn update<R>(&self, key: &SessionKey, f: impl FnOnce(&mut Session) -> R) -> R {
        let namespaced = key.namespaced();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(namespaced.clone())
            .or_insert_with(|| Session::new(namespaced));
        f(session)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn history(&self, key: &SessionKey) -> Vec<Message> {
        self.sessions
            .read()
            .await
            .get(&key.namespaced())
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    async fn summary(&self, key: &SessionKey) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(&key.namespaced())
            .and_then(|s| s.summary.clone())
    }

    async fn add_message(&self, key: &SessionKey, message: Message) -> Result<(), SessionError> {
        self.update(key, |s| s.push(message)).await;
        Ok(())
    }

    async fn set_summary(&self, key: &SessionKey, summary: String) {
        self.update(key, |s| s.set_summary(summary)).await;
    }

    async fn truncate_history(&self, key: &SessionKey, keep_last: usize) {
        self.update(key, |s| s.truncate(keep_last)).await;
    }

    async fn drop_oldest(&self, key: &SessionKey, count: usize) {
        self.update(key, |s| s.drop_oldest(count)).await;
    }

    async fn save(&self, _key: &SessionKey) -> Result<(), SessionError> {
        Ok(())
    }
}
