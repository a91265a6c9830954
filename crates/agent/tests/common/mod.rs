//! Scripted collaborators shared by the agent integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pincer_agent::AgentLoop;
use pincer_config::AgentConfig;
use pincer_core::error::{ProviderError, ToolError};
use pincer_core::message::{Message, MessageToolCall};
use pincer_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta};
use pincer_core::tool::{Tool, ToolContext, ToolRegistry, ToolResult};
use pincer_session::InMemorySessionStore;
use tokio::sync::mpsc;

// ── Scripted provider ────────────────────────────────────────────────────

/// One scripted model call.
pub enum Step {
    Reply(ProviderResponse),
    Fail(ProviderError),
    /// Raw stream items, delivered as-is by `stream()`
    Chunks(Vec<Result<StreamChunk, ProviderError>>),
}

/// Returns scripted steps in order and records every request. Once the
/// script runs out, `fallback` (if set) answers every further call.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    fallback: Option<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
    streaming: bool,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            streaming: false,
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Step::Reply(text_response(t))).collect())
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_fallback(mut self, response: ProviderResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ProviderRequest) -> Step {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        match self.steps.lock().unwrap().pop_front() {
            Some(step) => step,
            None => match &self.fallback {
                Some(response) => Step::Reply(response.clone()),
                None => panic!("ScriptedProvider exhausted at call #{n}"),
            },
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Step::Reply(response) => Ok(response),
            Step::Fail(e) => Err(e),
            Step::Chunks(_) => panic!("chunk script consumed by a buffered call"),
        }
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let items = match self.next(request) {
            Step::Chunks(items) => items,
            Step::Reply(response) => {
                let mut items = vec![Ok(StreamChunk::text(response.message.content))];
                for (index, call) in response.message.tool_calls.into_iter().enumerate() {
                    items.push(Ok(StreamChunk {
                        tool_calls: vec![ToolCallDelta {
                            index,
                            id: Some(call.id),
                            name: Some(call.name),
                            arguments: call.arguments,
                        }],
                        ..StreamChunk::default()
                    }));
                }
                items.push(Ok(StreamChunk::finished("stop")));
                items
            }
            Step::Fail(e) => return Err(e),
        };

        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            tx.send(item).await.expect("receiver alive");
        }
        Ok(rx)
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: None,
        model: "scripted-model".into(),
        finish_reason: Some("stop".into()),
    }
}

pub fn tool_response(calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools("", calls),
        usage: None,
        model: "scripted-model".into(),
        finish_reason: Some("tool_calls".into()),
    }
}

pub fn call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall::new(id, name, args.to_string())
}

pub fn text_chunk(text: &str) -> Result<StreamChunk, ProviderError> {
    Ok(StreamChunk::text(text))
}

pub fn done_chunk() -> Result<StreamChunk, ProviderError> {
    Ok(StreamChunk::finished("stop"))
}

pub fn fragment(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> Result<StreamChunk, ProviderError> {
    Ok(StreamChunk {
        tool_calls: vec![ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.to_string(),
        }],
        ..StreamChunk::default()
    })
}

// ── Tools ────────────────────────────────────────────────────────────────

/// Echoes its arguments back and records the context it ran with.
#[derive(Default)]
pub struct EchoTool {
    pub seen: Arc<Mutex<Vec<(serde_json::Value, ToolContext)>>>,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the arguments back"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        self.seen.lock().unwrap().push((arguments.clone(), ctx.clone()));
        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output: format!("echo: {arguments}"),
            data: None,
        })
    }
}

/// Always fails.
pub struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Fails every time"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _arguments: serde_json::Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "disk on fire".into(),
        })
    }
}

/// Registry with `echo` and `broken`; returns the echo tool's log.
pub fn test_registry() -> (ToolRegistry, Arc<Mutex<Vec<(serde_json::Value, ToolContext)>>>) {
    let echo = EchoTool::default();
    let seen = echo.seen.clone();
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(echo));
    registry.register(Box::new(BrokenTool));
    (registry, seen)
}

// ── Agent ────────────────────────────────────────────────────────────────

pub fn config(max_tool_iterations: usize) -> AgentConfig {
    AgentConfig {
        model: "test-model".into(),
        max_tool_iterations,
        ..AgentConfig::default()
    }
}

/// Agent over `provider` with the test registry and an in-memory store.
pub fn agent_with(provider: Arc<ScriptedProvider>, store: InMemorySessionStore) -> AgentLoop {
    let (registry, _) = test_registry();
    AgentLoop::new(provider, Arc::new(registry), Arc::new(store), config(5))
}
