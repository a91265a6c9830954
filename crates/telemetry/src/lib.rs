//! In-process metrics for Pincer agents.
//!
//! [`Metrics`] implements [`pincer_core::Observer`]: it counts LLM calls,
//! tool executions and agent runs, keeps per-model and per-tool breakdowns,
//! and holds a ring buffer of the most recent events.

pub mod engine;
pub mod model;

pub use engine::{MAX_RECENT_EVENTS, Metrics};
pub use model::{EventKind, MetricEvent, MetricsSnapshot, ModelMetrics, ToolMetrics};
