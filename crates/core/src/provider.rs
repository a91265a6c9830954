//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider sends a conversation to an LLM and gets a response back,
//! either as a complete message or as a pushed sequence of chunks.
//! Streaming is an advertised capability: callers check
//! [`Provider::supports_streaming`] and fall back to [`Provider::complete`]
//! when it is absent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;

/// Receiving end of a streamed response.
pub type ChunkReceiver = mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// The conversation messages, system prompt first
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message (content plus any tool calls)
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Why generation stopped ("stop", "tool_calls", "length")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One fragment of a streamed tool call.
///
/// Providers split a call across many chunks. Fragments sharing an `index`
/// belong to the same call; the fragment that carries a non-empty `id`
/// establishes the call's identity, and `arguments` pieces concatenate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Provider-assigned position of the call within the response
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Partial JSON text of the arguments
    #[serde(default)]
    pub arguments: String,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Partial tool call fragments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    /// Set once the provider knows why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A text-only chunk.
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            content: Some(delta.into()),
            ..Self::default()
        }
    }

    /// The terminating chunk.
    pub fn finished(finish_reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(finish_reason.into()),
            done: true,
            ..Self::default()
        }
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent engine calls
/// `complete()` or `stream()` without knowing which backend is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "mock").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Whether `stream()` delivers incremental chunks.
    ///
    /// Providers that keep the default `stream()` should leave this `false`
    /// so the engine uses its buffered fallback.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and replays the result as a
    /// single chunk followed by a terminator.
    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(2);
        let tool_calls = response
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(index, tc)| ToolCallDelta {
                index,
                id: Some(tc.id),
                name: Some(tc.name),
                arguments: tc.arguments,
            })
            .collect();
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                tool_calls,
                finish_reason: None,
                done: false,
                usage: None,
            }))
            .await;
        let _ = tx
            .send(Ok(StreamChunk {
                finish_reason: response.finish_reason.or_else(|| Some("stop".into())),
                done: true,
                usage: response.usage,
                ..StreamChunk::default()
            }))
            .await;
        Ok(rx)
    }

    /// The model used when a request does not name one.
    fn default_model(&self) -> &str {
        ""
    }
}
