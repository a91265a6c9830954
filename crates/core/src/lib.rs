//! # Pincer Core
//!
//! Domain types, collaborator traits, and error definitions for the Pincer
//! agent runtime. This crate has **no framework dependencies**: it defines
//! the contracts that the agent engine consumes and that the surrounding
//! crates implement.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent engine is a trait here:
//! - [`Provider`] — the LLM backend (buffered, optionally streamed)
//! - [`ToolInvoker`] — tool schema discovery and execution by name
//! - [`SessionStore`] — namespaced conversation history and rolling summary
//! - [`RateGate`] — per-sender admission
//! - [`Observer`] — fire-and-forget metrics sink
//!
//! Implementations live in their own crates, which keeps the engine easy to
//! test with in-memory stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod session;
pub mod bus;
pub mod event;
pub mod gate;
pub mod observe;
pub mod identity;

// Re-export key types at crate root for ergonomics
pub use error::{ChannelError, Error, ProviderError, Result, SessionError, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, ToolDefinition, Usage,
};
pub use tool::{Tool, ToolCall, ToolContext, ToolInvoker, ToolRegistry, ToolResult};
pub use session::{Session, SessionKey, SessionStore};
pub use bus::{InboundMessage, MessageBus, OutboundMessage, SYSTEM_CHANNEL};
pub use event::{ToolEvent, ToolStatus};
pub use gate::{OpenGate, RateGate};
pub use observe::{NoopObserver, Observer};
pub use identity::Identity;
