//! Message tool: lets the agent send a message to a chat mid-turn.
//!
//! The target defaults to the channel and chat the current turn came from;
//! the model can name another one explicitly.

use async_trait::async_trait;
use pincer_core::bus::{MessageBus, OutboundMessage};
use pincer_core::error::ToolError;
use pincer_core::tool::{Tool, ToolContext, ToolResult};
use std::sync::Arc;
use tracing::debug;

pub struct MessageTool {
    bus: Arc<MessageBus>,
}

impl MessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

/// Non-empty string argument, if present.
fn str_arg<'a>(arguments: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    arguments[key].as_str().map(str::trim).filter(|s| !s.is_empty())
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user on a chat channel. Defaults to the conversation the request came from."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message text to send"
                },
                "channel": {
                    "type": "string",
                    "description": "Optional target channel (e.g. telegram, discord)"
                },
                "chat_id": {
                    "type": "string",
                    "description": "Optional target chat id"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let content = str_arg(&arguments, "content")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let channel = str_arg(&arguments, "channel").unwrap_or(ctx.channel.as_str());
        let chat_id = str_arg(&arguments, "chat_id").unwrap_or(ctx.chat_id.as_str());
        if channel.is_empty() || chat_id.is_empty() {
            return Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: "No target channel/chat specified".into(),
                data: None,
            });
        }

        debug!(channel = %channel, chat_id = %chat_id, "Message tool publishing");
        self.bus
            .publish_outbound(OutboundMessage {
                tenant_id: None,
                channel: channel.to_string(),
                chat_id: chat_id.to_string(),
                content: content.to_string(),
            })
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "message".into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: format!("Message sent to {channel}:{chat_id}"),
            data: None,
        })
    }
}
