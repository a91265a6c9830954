//! Background history compaction.
//!
//! After a turn, a session whose history is long (by count or estimated
//! tokens) is compacted in a detached task: everything but the last few
//! messages is summarized into the session's rolling summary and then
//! dropped. At most one compaction runs per session key.

use crate::single_flight::InFlightSet;
use crate::token::{estimate_messages_tokens, estimate_tokens};
use pincer_config::SummaryConfig;
use pincer_core::error::ProviderError;
use pincer_core::message::{Message, Role};
use pincer_core::provider::{Provider, ProviderRequest};
use pincer_core::session::{SessionKey, SessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const OMISSION_NOTE: &str = "\n[Note: Some oversized messages were omitted from this summary for efficiency.]";

pub struct Summarizer {
    provider: Arc<dyn Provider>,
    sessions: Arc<dyn SessionStore>,
    model: String,
    context_window: usize,
    config: SummaryConfig,
    in_flight: InFlightSet,
}

impl Summarizer {
    pub fn new(
        provider: Arc<dyn Provider>,
        sessions: Arc<dyn SessionStore>,
        model: impl Into<String>,
        context_window: usize,
        config: SummaryConfig,
    ) -> Self {
        Self {
            provider,
            sessions,
            model: model.into(),
            context_window,
            config,
            in_flight: InFlightSet::new(),
        }
    }

    /// Share a guard set with other summarizers.
    pub fn with_in_flight(mut self, in_flight: InFlightSet) -> Self {
        self.in_flight = in_flight;
        self
    }

    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Whether `history` is past either compaction threshold.
    pub fn needs_summary(&self, history: &[Message]) -> bool {
        let token_threshold = self.context_window * self.config.token_ratio_percent / 100;
        history.len() > self.config.message_threshold || estimate_messages_tokens(history) > token_threshold
    }

    /// Start a compaction for `key` if it is due and none is running.
    ///
    /// Returns the spawned task, or `None` when nothing was started.
    pub async fn maybe_summarize(self: &Arc<Self>, key: &SessionKey) -> Option<JoinHandle<()>> {
        let history = self.sessions.history(key).await;
        if !self.needs_summary(&history) {
            return None;
        }

        let Some(guard) = self.in_flight.try_acquire(&key.namespaced()) else {
            debug!(session_key = %key, "Summarization already in flight");
            return None;
        };

        let this = Arc::clone(self);
        let key = key.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            this.summarize_session(&key).await;
        }))
    }

    /// Compact `key` now. Returns whether the session was changed.
    pub async fn summarize_session(&self, key: &SessionKey) -> bool {
        let deadline = Duration::from_secs(self.config.timeout_secs);
        let (summary, covered) = match tokio::time::timeout(deadline, self.build_summary(key)).await {
            Ok(Some(built)) => built,
            Ok(None) => return false,
            Err(_) => {
                warn!(session_key = %key, timeout_secs = self.config.timeout_secs, "Summarization timed out");
                return false;
            }
        };

        // Turns may have appended since the history was read; only the
        // summarized prefix goes.
        self.sessions.set_summary(key, summary).await;
        self.sessions.drop_oldest(key, covered).await;
        if let Err(e) = self.sessions.save(key).await {
            warn!(session_key = %key, error = %e, "Failed to save summarized session");
        }
        info!(session_key = %key, keep_last = self.config.keep_last, "Session history summarized");
        true
    }

    /// Produce the new summary text and the number of leading messages it
    /// covers, or `None` when there is nothing to summarize or every model
    /// call failed.
    async fn build_summary(&self, key: &SessionKey) -> Option<(String, usize)> {
        let history = self.sessions.history(key).await;
        if history.len() <= self.config.keep_last {
            return None;
        }
        let existing = self.sessions.summary(key).await;
        let older = &history[..history.len() - self.config.keep_last];

        let max_message_tokens = self.context_window / 2;
        let mut omitted = false;
        let candidates: Vec<&Message> = older
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .filter(|m| {
                let oversized = estimate_tokens(&m.content) > max_message_tokens;
                omitted |= oversized;
                !oversized
            })
            .collect();

        if candidates.is_empty() {
            return None;
        }

        debug!(
            session_key = %key,
            messages = candidates.len(),
            omitted,
            "Summarizing session history"
        );

        let mut summary = if candidates.len() > self.config.split_threshold {
            let (first, second) = candidates.split_at(candidates.len() / 2);
            let s1 = self.summarize_batch(first, None).await;
            let s2 = self.summarize_batch(second, None).await;
            match (s1, s2) {
                (Ok(s1), Ok(s2)) => self.merge(s1, s2).await,
                (Ok(only), Err(e)) | (Err(e), Ok(only)) => {
                    warn!(session_key = %key, error = %e, "Partial summary failed, keeping the other half");
                    only
                }
                (Err(e1), Err(e2)) => {
                    warn!(session_key = %key, first = %e1, second = %e2, "Summarization failed");
                    return None;
                }
            }
        } else {
            match self.summarize_batch(&candidates, existing.as_deref()).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(session_key = %key, error = %e, "Summarization failed");
                    return None;
                }
            }
        };

        if summary.is_empty() {
            return None;
        }
        if omitted {
            summary.push_str(OMISSION_NOTE);
        }
        Some((summary, older.len()))
    }

    async fn merge(&self, s1: String, s2: String) -> String {
        let prompt = format!(
            "Merge these two conversation summaries into one cohesive summary:\n\n1: {s1}\n\n2: {s2}"
        );
        match self.ask(prompt).await {
            Ok(merged) => merged,
            Err(e) => {
                warn!(error = %e, "Summary merge failed, concatenating halves");
                format!("{s1} {s2}")
            }
        }
    }

    async fn summarize_batch(&self, batch: &[&Message], existing: Option<&str>) -> Result<String, ProviderError> {
        let mut prompt = String::from(
            "Provide a concise summary of this conversation segment, preserving core context and key points.\n",
        );
        if let Some(existing) = existing.filter(|s| !s.is_empty()) {
            prompt.push_str(&format!("Existing context: {existing}\n"));
        }
        prompt.push_str("\nCONVERSATION:\n");
        for m in batch {
            prompt.push_str(&format!("{}: {}\n", m.role, m.content));
        }
        self.ask(prompt).await
    }

    async fn ask(&self, prompt: String) -> Result<String, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            temperature: self.config.temperature,
            max_tokens: Some(self.config.max_tokens),
            tools: vec![],
            stream: false,
        };
        Ok(self.provider.complete(request).await?.message.content)
    }
}
