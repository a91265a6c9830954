//! The agent execution engine: the heart of Pincer.
//!
//! One inbound message becomes one **turn**:
//!
//! 1. **Admit** the sender through the rate gate
//! 2. **Build context** (system prompt + summary + history + new user text)
//! 3. **Call the model**, buffered or streamed
//! 4. **If tool calls**: execute them, append results, loop back to step 3
//! 5. **If text**: persist it, maybe schedule compaction, return it
//!
//! The loop ends when the model answers without tool calls or the
//! iteration budget is spent. Every message is written to the session as it
//! is produced. Long sessions are compacted in the background, at most one
//! job per session at a time.

pub mod context;
pub mod engine;
pub mod loop_runner;
pub mod options;
pub mod single_flight;
pub mod stream;
pub mod summarize;
pub mod token;

#[cfg(test)]
mod test_helpers;

pub use context::{ContextAssembler, ContextInput, DefaultContextAssembler};
pub use loop_runner::{AgentLoop, RATE_LIMIT_MESSAGE, SYSTEM_DEFAULT_RESPONSE};
pub use options::{DirectRequest, ProcessOptions, TokenCallback, ToolCallback, TurnHandlers};
pub use single_flight::{InFlightGuard, InFlightSet};
pub use stream::FragmentAccumulator;
pub use summarize::Summarizer;
