//! Streamed model calls.
//!
//! Text deltas go to the turn's token handler as they arrive. Tool calls
//! arrive as fragments keyed by the provider's call index and are
//! reassembled once the stream ends.

use crate::engine::IterationOutcome;
use crate::loop_runner::AgentLoop;
use crate::options::ProcessOptions;
use crate::token::estimate_messages_tokens;
use pincer_core::error::{Error, Result};
use pincer_core::message::MessageToolCall;
use pincer_core::provider::{ProviderRequest, ToolCallDelta};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Reassembles streamed tool calls.
///
/// Fragments sharing an index belong to one call. A fragment with a
/// non-empty id sets that call's id (and name, when it carries one);
/// argument text is concatenated in arrival order.
#[derive(Debug, Default)]
pub struct FragmentAccumulator {
    calls: BTreeMap<usize, PartialCall>,
}

impl FragmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_default();
        let name = delta.name.filter(|n| !n.is_empty());

        let id = delta.id.filter(|id| !id.is_empty());
        let identifies = id.is_some();
        if let Some(id) = id {
            call.id = id;
        }
        if let Some(name) = name
            && (identifies || call.name.is_empty())
        {
            call.name = name;
        }

        call.arguments.push_str(&delta.arguments);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// The reassembled calls in index order. Calls that never received an
    /// id get `call_<index>`.
    pub fn finish(self) -> Vec<MessageToolCall> {
        self.calls
            .into_iter()
            .map(|(index, call)| {
                let id = if call.id.is_empty() { format!("call_{index}") } else { call.id };
                MessageToolCall::new(id, call.name, call.arguments)
            })
            .collect()
    }
}

impl AgentLoop {
    /// One streamed model call.
    ///
    /// A token handler error stops reading at once and ends the turn with
    /// [`Error::Cancelled`] carrying the text the handler accepted before
    /// the failing delta. A transport
    /// error before any output is fatal; after output, the stream is cut
    /// short and what arrived is kept.
    pub(crate) async fn call_streamed(&self, request: ProviderRequest, opts: &ProcessOptions) -> Result<IterationOutcome> {
        let model = request.model.clone();
        let tokens_in = estimate_messages_tokens(&request.messages);
        let started = Instant::now();

        let mut rx = match self.provider.stream(request).await {
            Ok(rx) => rx,
            Err(e) => {
                error!(model = %model, error = %e, "Failed to open stream");
                self.record_llm_call(&model, started.elapsed(), tokens_in, &IterationOutcome::default(), Some(&e.to_string()));
                return Err(e.into());
            }
        };

        let mut outcome = IterationOutcome::default();
        let mut fragments = FragmentAccumulator::new();
        let mut chunks = 0usize;

        while let Some(item) = rx.recv().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) if outcome.content.is_empty() && fragments.is_empty() => {
                    error!(model = %model, error = %e, "Stream failed before any output");
                    self.record_llm_call(&model, started.elapsed(), tokens_in, &outcome, Some(&e.to_string()));
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Stream interrupted, keeping partial output");
                    break;
                }
            };
            chunks += 1;

            if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
                // a rejected delta is not part of what the consumer received
                if let Some(on_token) = &opts.handlers.on_token
                    && let Err(reason) = on_token(&delta)
                {
                    debug!(session_key = %opts.session, reason = %reason, "Token consumer stopped the stream");
                    self.record_llm_call(&model, started.elapsed(), tokens_in, &outcome, Some("cancelled"));
                    return Err(Error::Cancelled {
                        reason,
                        partial: outcome.content,
                    });
                }
                outcome.content.push_str(&delta);
            }

            for delta in chunk.tool_calls {
                fragments.push(delta);
            }
            if chunk.usage.is_some() {
                outcome.usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        debug!(
            chunks,
            content_len = outcome.content.len(),
            tool_calls = fragments.len(),
            "Stream finished"
        );
        outcome.tool_calls = fragments.finish();
        self.record_llm_call(&model, started.elapsed(), tokens_in, &outcome, None);
        Ok(outcome)
    }
}
