//! Thread-safe metrics collector for LLM calls, tool executions and agent runs.

use crate::model::*;
use chrono::Utc;
use pincer_core::observe::Observer;
use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

/// Capacity of the recent-events ring buffer.
pub const MAX_RECENT_EVENTS: usize = 100;

/// In-process metrics collector.
///
/// Thread-safe via `RwLock`; each record call holds the write lock only
/// for a handful of counter updates.
pub struct Metrics {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    totals: MetricsSnapshot,
    recent: VecDeque<MetricEvent>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                totals: MetricsSnapshot {
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
                recent: VecDeque::with_capacity(MAX_RECENT_EVENTS),
            }),
        }
    }

    /// Copy out the current counters and recent events.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = state.totals.clone();
        snapshot.recent_events = state.recent.iter().cloned().collect();
        snapshot
    }

    /// Snapshot as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    fn push_event(state: &mut State, event: MetricEvent) {
        if state.recent.len() == MAX_RECENT_EVENTS {
            state.recent.pop_front();
        }
        state.recent.push_back(event);
    }

    fn event(kind: EventKind, duration_ms: u64, error: Option<&str>) -> MetricEvent {
        MetricEvent {
            kind,
            model: None,
            tool: None,
            duration_ms,
            error: error.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for Metrics {
    fn record_llm_call(
        &self,
        model: &str,
        duration: Duration,
        tokens_in: u32,
        tokens_out: u32,
        error: Option<&str>,
    ) {
        let ms = duration.as_millis() as u64;
        let failed = u64::from(error.is_some());
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let totals = &mut state.totals;
        totals.llm_calls += 1;
        totals.llm_errors += failed;
        totals.llm_total_ms += ms;
        totals.llm_tokens_in += u64::from(tokens_in);
        totals.llm_tokens_out += u64::from(tokens_out);

        let per_model = totals.llm_by_model.entry(model.to_string()).or_default();
        per_model.calls += 1;
        per_model.errors += failed;
        per_model.total_ms += ms;
        per_model.tokens_in += u64::from(tokens_in);
        per_model.tokens_out += u64::from(tokens_out);

        let mut event = Self::event(EventKind::LlmCall, ms, error);
        event.model = Some(model.to_string());
        Self::push_event(&mut state, event);
    }

    fn record_tool_call(&self, name: &str, duration: Duration, error: Option<&str>) {
        let ms = duration.as_millis() as u64;
        let failed = u64::from(error.is_some());
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let totals = &mut state.totals;
        totals.tool_calls += 1;
        totals.tool_errors += failed;
        totals.tool_total_ms += ms;

        let per_tool = totals.tool_by_name.entry(name.to_string()).or_default();
        per_tool.calls += 1;
        per_tool.errors += failed;
        per_tool.total_ms += ms;

        let mut event = Self::event(EventKind::ToolCall, ms, error);
        event.tool = Some(name.to_string());
        Self::push_event(&mut state, event);
    }

    fn record_agent_run(&self, duration: Duration, iterations: usize, error: Option<&str>) {
        let ms = duration.as_millis() as u64;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let totals = &mut state.totals;
        totals.agent_runs += 1;
        totals.agent_errors += u64::from(error.is_some());
        totals.agent_total_ms += ms;
        totals.agent_iterations_total += iterations as u64;

        Self::push_event(&mut state, Self::event(EventKind::AgentRun, ms, error));
    }
}
