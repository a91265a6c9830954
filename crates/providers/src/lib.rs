//! LLM Provider implementations for Pincer.
//!
//! All providers implement the `pincer_core::Provider` trait.

pub mod mock;

pub use mock::MockProvider;
