//! File-based session store: one pretty-printed JSON file per session.
//!
//! Storage location: `<workspace>/sessions/<escaped key>.json`
//!
//! Sessions are loaded into memory on creation. Every `add_message` writes
//! the affected session back to disk, and `save` rewrites it after summary
//! or truncation changes. Reads are served from memory.

use async_trait::async_trait;
use pincer_core::error::SessionError;
use pincer_core::message::Message;
use pincer_core::session::{Session, SessionKey, SessionStore};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::in_memory::InMemorySessionStore;

/// A directory of JSON session files with an in-memory cache.
pub struct FileSessionStore {
    dir: PathBuf,
    cache: InMemorySessionStore,
}

impl FileSessionStore {
    /// Open the store at `dir`, loading every readable session file.
    ///
    /// A missing directory starts empty and is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let sessions = Self::load_from_disk(&dir);
        debug!(dir = %dir.display(), count = sessions.len(), "File session store loaded");
        Self {
            dir,
            cache: InMemorySessionStore::with_sessions(sessions),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A copy of one session, if it exists.
    pub async fn snapshot(&self, key: &SessionKey) -> Option<Session> {
        self.cache.snapshot(key).await
    }

    /// File name for a namespaced key. Path separators, `:` and `%` are
    /// percent-escaped, so distinct keys never share a file.
    fn file_name(namespaced: &str) -> String {
        let mut safe = String::with_capacity(namespaced.len() + 5);
        for c in namespaced.chars() {
            match c {
                '%' => safe.push_str("%25"),
                '/' => safe.push_str("%2F"),
                ':' => safe.push_str("%3A"),
                '\\' => safe.push_str("%5C"),
                other => safe.push(other),
            }
        }
        safe.push_str(".json");
        safe
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(Self::file_name(&key.namespaced()))
    }

    fn load_from_disk(dir: &Path) -> Vec<Session> {
        let entries = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(_) => return Vec::new(),
        };

        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .filter_map(|path| {
                let content = std::fs::read_to_string(&path).ok()?;
                match serde_json::from_str::<Session>(&content) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Skipping corrupted session file");
                        None
                    }
                }
            })
            .collect()
    }

    /// Write one session to its file.
    async fn flush(&self, key: &SessionKey) -> Result<(), SessionError> {
        let Some(session) = self.cache.snapshot(key).await else {
            return Ok(());
        };

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| SessionError::Storage(format!("Failed to create session directory: {e}")))?;

        let json = serde_json::to_string_pretty(&session).map_err(|e| SessionError::Encode {
            key: session.key.clone(),
            reason: e.to_string(),
        })?;

        let path = self.path_for(key);
        std::fs::write(&path, json).map_err(|e| {
            SessionError::Storage(format!("Failed to write session file {}: {e}", path.display()))
        })?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn history(&self, key: &SessionKey) -> Vec<Message> {
        self.cache.history(key).await
    }

    async fn summary(&self, key: &SessionKey) -> Option<String> {
        self.cache.summary(key).await
    }

    async fn add_message(&self, key: &SessionKey, message: Message) -> Result<(), SessionError> {
        self.cache.update(key, |s| s.push(message)).await;
        self.flush(key).await
    }

    async fn set_summary(&self, key: &SessionKey, summary: String) {
        self.cache.set_summary(key, summary).await;
    }

    async fn truncate_history(&self, key: &SessionKey, keep_last: usize) {
        self.cache.truncate_history(key, keep_last).await;
    }

    async fn drop_oldest(&self, key: &SessionKey, count: usize) {
        self.cache.drop_oldest(key, count).await;
    }

    async fn save(&self, key: &SessionKey) -> Result<(), SessionError> {
        self.flush(key).await
    }
}
