//! Session store contract: the durable conversation record.
//!
//! A session holds the ordered message list for one user/channel pairing
//! plus an optional rolling summary. Once a summary exists the message list
//! only keeps a recent tail; the model sees `summary + tail`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::message::{Message, Role};

/// A session key, optionally scoped to a tenant (numeric user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<i64>,
    pub key: String,
}

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            tenant: None,
            key: key.into(),
        }
    }

    /// Scope this key to a tenant. Ids `<= 0` mean "no tenant".
    pub fn with_tenant(mut self, tenant: Option<i64>) -> Self {
        self.tenant = tenant.filter(|id| *id > 0);
        self
    }

    /// The storage key: `user:<id>:<key>` for tenants, else the bare key.
    pub fn namespaced(&self) -> String {
        match self.tenant {
            Some(id) => format!("user:{id}:{}", self.key),
            None => self.key.clone(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.namespaced())
    }
}

/// One conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Namespaced key this session is stored under
    pub key: String,

    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            messages: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Replace the summary. Blank text clears it.
    pub fn set_summary(&mut self, summary: impl Into<String>) {
        let summary = summary.into();
        self.summary = if summary.trim().is_empty() { None } else { Some(summary) };
        self.updated_at = Utc::now();
    }

    /// Keep only the last `keep_last` messages.
    pub fn truncate(&mut self, keep_last: usize) {
        let len = self.messages.len();
        if len > keep_last {
            self.messages.drain(..len - keep_last);
            self.updated_at = Utc::now();
        }
    }

    /// Remove the `count` oldest messages.
    pub fn drop_oldest(&mut self, count: usize) {
        let count = count.min(self.messages.len());
        if count > 0 {
            self.messages.drain(..count);
            self.updated_at = Utc::now();
        }
    }
}

/// What the agent engine needs from session storage.
///
/// Every method is addressed by a [`SessionKey`], so tenants never see each
/// other's sessions. Unknown keys read as empty.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Ordered message history.
    async fn history(&self, key: &SessionKey) -> Vec<Message>;

    /// Current rolling summary, if any.
    async fn summary(&self, key: &SessionKey) -> Option<String>;

    /// Append a full message (tool calls and tool-call id included) and
    /// forward it to durable storage.
    async fn add_message(&self, key: &SessionKey, message: Message) -> std::result::Result<(), SessionError>;

    /// Append a plain text message.
    async fn add_text(
        &self,
        key: &SessionKey,
        role: Role,
        content: &str,
    ) -> std::result::Result<(), SessionError> {
        let message = match role {
            Role::User => Message::user(content),
            Role::Assistant => Message::assistant(content),
            Role::System => Message::system(content),
            Role::Tool => {
                return Err(SessionError::Storage(
                    "tool messages need a tool_call_id; use add_message".into(),
                ));
            }
        };
        self.add_message(key, message).await
    }

    /// Replace the rolling summary (in memory until `save`).
    async fn set_summary(&self, key: &SessionKey, summary: String);

    /// Drop all but the last `keep_last` messages (in memory until `save`).
    async fn truncate_history(&self, key: &SessionKey, keep_last: usize);

    /// Drop the `count` oldest messages (in memory until `save`). Messages
    /// appended after a caller read the history are never touched.
    async fn drop_oldest(&self, key: &SessionKey, count: usize);

    /// Persist the session to durable storage.
    async fn save(&self, key: &SessionKey) -> std::result::Result<(), SessionError>;
}
