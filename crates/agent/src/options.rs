//! Per-turn options and the handler types callers plug into a turn.

use pincer_core::event::ToolEvent;
use pincer_core::session::SessionKey;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Receives each streamed text delta. Returning `Err` stops the turn.
pub type TokenCallback = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Receives tool lifecycle notifications.
pub type ToolCallback = Arc<dyn Fn(&ToolEvent) + Send + Sync>;

/// Optional listeners for a streamed turn.
#[derive(Clone, Default)]
pub struct TurnHandlers {
    pub on_token: Option<TokenCallback>,
    pub on_tool: Option<ToolCallback>,
}

impl TurnHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_token(mut self, f: impl Fn(&str) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.on_token = Some(Arc::new(f));
        self
    }

    pub fn with_on_tool(mut self, f: impl Fn(&ToolEvent) + Send + Sync + 'static) -> Self {
        self.on_tool = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for TurnHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnHandlers")
            .field("on_token", &self.on_token.is_some())
            .field("on_tool", &self.on_tool.is_some())
            .finish()
    }
}

/// Everything one turn needs. Built fresh per inbound message.
#[derive(Clone)]
pub struct ProcessOptions {
    pub session: SessionKey,
    pub channel: String,
    pub chat_id: String,
    pub user_message: String,
    pub media: Vec<String>,
    /// Used when the model ends the turn without text
    pub default_response: String,
    /// Check compaction thresholds after the turn
    pub enable_summary: bool,
    /// Publish the final text to the outbound bus
    pub send_response: bool,
    pub model_override: Option<String>,
    /// Tools hidden from the model for this turn only
    pub exclude_tools: HashSet<String>,
    pub handlers: TurnHandlers,
}

impl ProcessOptions {
    pub fn new(session: SessionKey, channel: impl Into<String>, chat_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            session,
            channel: channel.into(),
            chat_id: chat_id.into(),
            user_message: user_message.into(),
            media: Vec::new(),
            default_response: String::new(),
            enable_summary: false,
            send_response: false,
            model_override: None,
            exclude_tools: HashSet::new(),
            handlers: TurnHandlers::default(),
        }
    }

    pub(crate) fn emit_tool(&self, event: ToolEvent) {
        if let Some(on_tool) = &self.handlers.on_tool {
            on_tool(&event);
        }
    }
}

impl fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("session", &self.session)
            .field("channel", &self.channel)
            .field("chat_id", &self.chat_id)
            .field("enable_summary", &self.enable_summary)
            .field("send_response", &self.send_response)
            .field("model_override", &self.model_override)
            .field("exclude_tools", &self.exclude_tools)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// A turn started by code rather than a chat surface (cron jobs, the CLI).
#[derive(Debug, Clone)]
pub struct DirectRequest {
    pub content: String,
    pub session_key: String,
    pub channel: String,
    pub chat_id: String,
    pub sender_id: String,
    pub tenant_id: Option<i64>,
    pub model_override: Option<String>,
    pub exclude_tools: HashSet<String>,
}

impl DirectRequest {
    pub fn new(content: impl Into<String>, session_key: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            session_key: session_key.into(),
            channel: "cli".into(),
            chat_id: "direct".into(),
            sender_id: "cron".into(),
            tenant_id: None,
            model_override: None,
            exclude_tools: HashSet::new(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        self.channel = channel.into();
        self.chat_id = chat_id.into();
        self
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Use `model` instead of the configured one. Blank means no override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model_override = if model.trim().is_empty() { None } else { Some(model) };
        self
    }

    pub fn with_excluded_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_tools.extend(names.into_iter().map(Into::into));
        self
    }
}
