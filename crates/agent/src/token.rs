//! Token estimation utilities.
//!
//! Character heuristic: ~4 bytes per token, rounded down. Only used for
//! threshold decisions (when to compact history), never for billing.

use pincer_core::message::Message;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Estimate tokens for a slice of messages (content only).
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}
