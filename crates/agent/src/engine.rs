//! The bounded model/tool iteration loop.
//!
//! Each iteration makes one model call. A reply without tool calls ends
//! the turn; otherwise every requested tool runs, its result is appended
//! as a `tool` message, and the loop goes around again. A tool failure is
//! fed back to the model as `Error: ...` text and never ends the turn; a
//! model call failure does.

use crate::loop_runner::AgentLoop;
use crate::options::ProcessOptions;
use crate::token::{estimate_messages_tokens, estimate_tokens};
use pincer_core::error::Result;
use pincer_core::event::ToolEvent;
use pincer_core::message::{Message, MessageToolCall};
use pincer_core::provider::{ProviderRequest, ToolDefinition, Usage};
use pincer_core::session::SessionKey;
use pincer_core::tool::{ToolCall, ToolContext};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Messages and progress of one turn.
#[derive(Debug, Default)]
pub(crate) struct TurnState {
    pub messages: Vec<Message>,
    /// Model calls made so far
    pub iterations: usize,
}

/// What one model call produced.
#[derive(Debug, Default)]
pub(crate) struct IterationOutcome {
    pub content: String,
    pub tool_calls: Vec<MessageToolCall>,
    pub usage: Option<Usage>,
}

impl AgentLoop {
    /// Run iterations until the model answers without tools or the budget
    /// is spent. With `stream` set, text is pushed to the turn's token
    /// handler as it arrives.
    pub(crate) async fn run_iterations(
        &self,
        state: &mut TurnState,
        opts: &ProcessOptions,
        stream: bool,
    ) -> Result<String> {
        let tools = self.tool_definitions(opts);
        let model = self.resolve_model(opts);
        let max_iterations = self.config.max_tool_iterations;
        let mut final_content = String::new();
        let mut answered = false;

        while state.iterations < max_iterations {
            state.iterations += 1;
            debug!(
                session_key = %opts.session,
                iteration = state.iterations,
                max = max_iterations,
                "Agent loop iteration"
            );

            let request = ProviderRequest {
                model: model.clone(),
                messages: state.messages.clone(),
                temperature: self.config.temperature,
                max_tokens: Some(self.config.max_tokens),
                tools: tools.clone(),
                stream,
            };

            let outcome = if stream && self.provider.supports_streaming() {
                self.call_streamed(request, opts).await?
            } else {
                let outcome = self.call_buffered(request).await?;
                if stream && outcome.tool_calls.is_empty() {
                    Self::deliver_whole(&outcome.content, opts);
                }
                outcome
            };

            if outcome.tool_calls.is_empty() {
                final_content = outcome.content;
                answered = true;
                break;
            }

            self.handle_tool_calls(state, outcome, opts).await;
        }

        if !answered {
            warn!(
                session_key = %opts.session,
                iterations = state.iterations,
                "Max tool iterations reached without a final answer"
            );
        }

        Ok(final_content)
    }

    /// One request/response model call.
    pub(crate) async fn call_buffered(&self, request: ProviderRequest) -> Result<IterationOutcome> {
        let model = request.model.clone();
        let tokens_in = estimate_messages_tokens(&request.messages);
        let started = Instant::now();

        match self.provider.complete(request).await {
            Ok(response) => {
                let outcome = IterationOutcome {
                    content: response.message.content,
                    tool_calls: response.message.tool_calls,
                    usage: response.usage,
                };
                self.record_llm_call(&model, started.elapsed(), tokens_in, &outcome, None);
                Ok(outcome)
            }
            Err(e) => {
                error!(model = %model, error = %e, "LLM call failed");
                self.record_llm_call(&model, started.elapsed(), tokens_in, &IterationOutcome::default(), Some(&e.to_string()));
                Err(e.into())
            }
        }
    }

    pub(crate) fn record_llm_call(
        &self,
        model: &str,
        duration: Duration,
        estimated_in: usize,
        outcome: &IterationOutcome,
        error: Option<&str>,
    ) {
        let (tokens_in, tokens_out) = match &outcome.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (estimated_in as u32, estimate_tokens(&outcome.content) as u32),
        };
        self.observer.record_llm_call(model, duration, tokens_in, tokens_out, error);
    }

    /// Buffered fallback for a streamed turn: the whole answer goes to the
    /// token handler as a single chunk. The answer is already complete, so
    /// a handler error does not cancel the turn.
    fn deliver_whole(content: &str, opts: &ProcessOptions) {
        let Some(on_token) = &opts.handlers.on_token else {
            return;
        };
        if content.is_empty() {
            return;
        }
        if let Err(reason) = on_token(content) {
            warn!(session_key = %opts.session, reason = %reason, "Token handler rejected buffered answer");
        }
    }

    /// Record the assistant's tool request, then run each call in order.
    async fn handle_tool_calls(&self, state: &mut TurnState, outcome: IterationOutcome, opts: &ProcessOptions) {
        debug!(tool_count = outcome.tool_calls.len(), "Executing tool calls");

        let assistant = Message::assistant_with_tools(outcome.content, outcome.tool_calls.clone());
        state.messages.push(assistant.clone());
        self.persist(&opts.session, assistant).await;

        let ctx = ToolContext::new(&opts.channel, &opts.chat_id);
        for tc in outcome.tool_calls {
            let arguments = parse_arguments(&tc.arguments);
            info!(tool = %tc.name, iteration = state.iterations, "Tool call: {}({})", tc.name, preview(&tc.arguments, 200));
            opts.emit_tool(ToolEvent::started(&tc.name, arguments.clone()));

            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments: arguments.clone(),
            };
            let started = Instant::now();
            let result = self.tools.execute_with_context(&call, &ctx).await;
            let elapsed = started.elapsed();

            let content = match result {
                Ok(output) => {
                    self.observer.record_tool_call(&tc.name, elapsed, None);
                    opts.emit_tool(ToolEvent::finished(&tc.name, arguments, &output));
                    output
                }
                Err(e) => {
                    warn!(tool = %tc.name, error = %e, "Tool execution failed");
                    self.observer.record_tool_call(&tc.name, elapsed, Some(&e.to_string()));
                    let text = format!("Error: {e}");
                    opts.emit_tool(ToolEvent::failed(&tc.name, arguments, &text));
                    text
                }
            };

            let message = Message::tool_result(tc.id, content);
            state.messages.push(message.clone());
            self.persist(&opts.session, message).await;
        }
    }

    /// Append to the session; a storage failure is logged, not fatal.
    pub(crate) async fn persist(&self, key: &SessionKey, message: Message) {
        if let Err(e) = self.sessions.add_message(key, message).await {
            warn!(session_key = %key, error = %e, "Failed to persist message");
        }
    }

    /// Every tool the invoker offers, minus the turn's exclusions.
    pub(crate) fn tool_definitions(&self, opts: &ProcessOptions) -> Vec<ToolDefinition> {
        self.tools
            .definitions()
            .into_iter()
            .filter(|def| !opts.exclude_tools.contains(&def.name))
            .collect()
    }

    pub(crate) fn resolve_model(&self, opts: &ProcessOptions) -> String {
        opts.model_override
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.config.model)
            .to_string()
    }
}

/// Parse tool arguments. Empty text is `{}`; malformed text is kept as
/// `{"raw": <text>}` so the tool can still see it.
pub(crate) fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({ "raw": raw }))
}

/// First `max_chars` characters of `text`, with `...` when cut.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text.to_string(),
    }
}
