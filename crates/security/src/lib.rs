//! Security module for Pincer: admission control.
//!
//! Provides:
//! - **Rate limiting**: per-sender sliding-window limiter implementing [`pincer_core::RateGate`]

pub mod ratelimit;

pub use ratelimit::SlidingWindowLimiter;
