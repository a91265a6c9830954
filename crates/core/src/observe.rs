//! Observability sink. Calls are fire-and-forget: implementations must not
//! block and never influence control flow.

use std::time::Duration;

pub trait Observer: Send + Sync {
    fn record_llm_call(
        &self,
        model: &str,
        duration: Duration,
        tokens_in: u32,
        tokens_out: u32,
        error: Option<&str>,
    );

    fn record_tool_call(&self, name: &str, duration: Duration, error: Option<&str>);

    fn record_agent_run(&self, duration: Duration, iterations: usize, error: Option<&str>);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record_llm_call(&self, _: &str, _: Duration, _: u32, _: u32, _: Option<&str>) {}
    fn record_tool_call(&self, _: &str, _: Duration, _: Option<&str>) {}
    fn record_agent_run(&self, _: Duration, _: usize, _: Option<&str>) {}
}
