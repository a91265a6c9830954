//! # Pincer Session
//!
//! Implementations of [`pincer_core::SessionStore`]:
//! - [`InMemorySessionStore`] — process-lifetime storage for tests and one-shot runs
//! - [`FileSessionStore`] — one pretty-printed JSON file per session, written through on every append

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileSessionStore;
pub use in_memory::InMemorySessionStore;
