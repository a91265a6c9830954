//! Data model for recorded metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-model LLM call breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub calls: u64,
    pub errors: u64,
    pub total_ms: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Per-tool execution breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub calls: u64,
    pub errors: u64,
    pub total_ms: u64,
}

/// What kind of operation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LlmCall,
    ToolCall,
    AgentRun,
}

/// One entry in the recent-events ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
}

/// Point-in-time copy of everything the collector knows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub llm_calls: u64,
    pub llm_errors: u64,
    pub llm_total_ms: u64,
    pub llm_tokens_in: u64,
    pub llm_tokens_out: u64,
    pub llm_by_model: HashMap<String, ModelMetrics>,

    pub tool_calls: u64,
    pub tool_errors: u64,
    pub tool_total_ms: u64,
    pub tool_by_name: HashMap<String, ToolMetrics>,

    pub agent_runs: u64,
    pub agent_errors: u64,
    pub agent_total_ms: u64,
    pub agent_iterations_total: u64,

    /// Oldest first
    pub recent_events: Vec<MetricEvent>,

    pub started_at: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    /// Mean LLM call latency in milliseconds (0 when no calls).
    pub fn avg_llm_ms(&self) -> u64 {
        if self.llm_calls == 0 { 0 } else { self.llm_total_ms / self.llm_calls }
    }

    /// Mean model calls per agent run (0 when no runs).
    pub fn avg_iterations(&self) -> f64 {
        if self.agent_runs == 0 {
            0.0
        } else {
            self.agent_iterations_total as f64 / self.agent_runs as f64
        }
    }
}
