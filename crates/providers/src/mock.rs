//! Deterministic provider for local runs and tests: no network calls.
//!
//! Behavior:
//! - If tools are offered and the last message is a user message of the form
//!   `/tool <name> <json args>`, the reply is a single call to that tool.
//! - Otherwise the reply is `Mock response to: <last message content>`.
//!
//! With [`MockProvider::streaming`] the reply is pushed word by word, and a
//! tool call's arguments are split across two fragments.

use async_trait::async_trait;
use pincer_core::error::ProviderError;
use pincer_core::message::{Message, MessageToolCall, Role};
use pincer_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, Usage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

const TOOL_PREFIX: &str = "/tool ";

pub struct MockProvider {
    model: String,
    streaming: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            model: "mock".into(),
            streaming: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Advertise streaming and push replies word by word.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Number of requests served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Parse `/tool <name> <json>`; args default to `{}`.
    fn parse_tool_command(content: &str) -> Option<(String, String)> {
        let rest = content.trim().strip_prefix(TOOL_PREFIX)?;
        let (name, args) = match rest.trim().split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest.trim(), ""),
        };
        if name.is_empty() {
            return None;
        }
        let args = if args.is_empty() { "{}" } else { args };
        Some((name.to_string(), args.to_string()))
    }

    fn respond(&self, request: &ProviderRequest) -> ProviderResponse {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let last = request.messages.last();
        let prompt_tokens = request.messages.iter().map(|m| m.content.len() / 4).sum::<usize>() as u32;

        let tool_call = last
            .filter(|m| m.role == Role::User && !request.tools.is_empty())
            .and_then(|m| Self::parse_tool_command(&m.content))
            .filter(|(name, _)| request.tools.iter().any(|t| &t.name == name));

        let (message, finish_reason) = match tool_call {
            Some((name, arguments)) => {
                debug!(tool = %name, "Mock provider requesting tool call");
                let call = MessageToolCall::new(format!("mock-call-{n}"), name, arguments);
                (Message::assistant_with_tools("", vec![call]), "tool_calls")
            }
            None => {
                let content = last.map(|m| m.content.as_str()).unwrap_or_default();
                (Message::assistant(format!("Mock response to: {content}")), "stop")
            }
        };

        let completion_tokens = (message.content.len() / 4) as u32;
        ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            model: if request.model.is_empty() {
                self.model.clone()
            } else {
                request.model.clone()
            },
            finish_reason: Some(finish_reason.into()),
        }
    }

    /// Break a response into the chunk sequence a streaming backend would send.
    fn chunks(response: ProviderResponse) -> Vec<StreamChunk> {
        let mut chunks: Vec<StreamChunk> = response
            .message
            .content
            .split_inclusive(' ')
            .map(StreamChunk::text)
            .collect();

        for (index, call) in response.message.tool_calls.into_iter().enumerate() {
            let mid = call.arguments.char_indices().nth(call.arguments.chars().count() / 2);
            let (head, tail) = match mid {
                Some((at, _)) => call.arguments.split_at(at),
                None => (call.arguments.as_str(), ""),
            };
            chunks.push(StreamChunk {
                tool_calls: vec![ToolCallDelta {
                    index,
                    id: Some(call.id.clone()),
                    name: Some(call.name.clone()),
                    arguments: head.to_string(),
                }],
                ..StreamChunk::default()
            });
            chunks.push(StreamChunk {
                tool_calls: vec![ToolCallDelta {
                    index,
                    arguments: tail.to_string(),
                    ..ToolCallDelta::default()
                }],
                ..StreamChunk::default()
            });
        }

        chunks.push(StreamChunk {
            finish_reason: response.finish_reason,
            done: true,
            usage: response.usage,
            ..StreamChunk::default()
        });
        chunks
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(self.respond(&request))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let chunks = Self::chunks(self.respond(&request));
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
