//! Built-in tool implementations for Pincer.
//!
//! Tools give the agent the ability to act on the user's behalf. Each one
//! receives the turn's [`pincer_core::ToolContext`] so it knows which
//! channel and chat the request came from.

pub mod message;

use pincer_core::bus::MessageBus;
use pincer_core::tool::ToolRegistry;
use std::sync::Arc;

pub use message::MessageTool;

/// Create a tool registry with all built-in tools.
pub fn default_registry(bus: Arc<MessageBus>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(MessageTool::new(bus)));
    registry
}
