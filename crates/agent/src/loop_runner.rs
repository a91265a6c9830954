//! The agent loop: turns inbound messages into model/tool turns.

use crate::context::{ContextAssembler, ContextInput, DefaultContextAssembler};
use crate::engine::{TurnState, preview};
use crate::options::{DirectRequest, ProcessOptions, TurnHandlers};
use crate::single_flight::InFlightSet;
use crate::summarize::Summarizer;
use pincer_config::{AgentConfig, AppConfig, SummaryConfig};
use pincer_core::bus::{InboundMessage, MessageBus, OutboundMessage};
use pincer_core::error::{Error, Result};
use pincer_core::gate::{OpenGate, RateGate};
use pincer_core::identity::Identity;
use pincer_core::message::Message;
use pincer_core::observe::{NoopObserver, Observer};
use pincer_core::provider::Provider;
use pincer_core::session::{SessionKey, SessionStore};
use pincer_core::tool::ToolInvoker;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Reply given instead of a turn when the sender is over their rate limit.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please wait a moment before sending more messages.";

/// Default reply for system-originated turns that end without text.
pub const SYSTEM_DEFAULT_RESPONSE: &str = "Background task completed.";

/// Per-call knobs that only direct callers can set.
#[derive(Default)]
struct TurnOverrides {
    model: Option<String>,
    exclude_tools: HashSet<String>,
    handlers: TurnHandlers,
    stream: bool,
}

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) tools: Arc<dyn ToolInvoker>,
    pub(crate) sessions: Arc<dyn SessionStore>,
    assembler: Arc<dyn ContextAssembler>,
    rate_gate: Arc<dyn RateGate>,
    pub(crate) observer: Arc<dyn Observer>,
    bus: Option<Arc<MessageBus>>,
    pub(crate) config: AgentConfig,
    summary_config: SummaryConfig,
    summarizer: Arc<Summarizer>,
}

impl AgentLoop {
    /// Create an agent loop with default collaborators: the built-in
    /// identity, no rate limiting, no metrics and no bus.
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolInvoker>,
        sessions: Arc<dyn SessionStore>,
        config: AgentConfig,
    ) -> Self {
        let summary_config = SummaryConfig::default();
        let summarizer = Arc::new(Summarizer::new(
            provider.clone(),
            sessions.clone(),
            config.model.clone(),
            config.context_window,
            summary_config.clone(),
        ));
        Self {
            provider,
            tools,
            sessions,
            assembler: Arc::new(DefaultContextAssembler::default()),
            rate_gate: Arc::new(OpenGate),
            observer: Arc::new(NoopObserver),
            bus: None,
            config,
            summary_config,
            summarizer,
        }
    }

    /// Create an agent loop from the agent and summary sections of `config`.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolInvoker>,
        sessions: Arc<dyn SessionStore>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, tools, sessions, config.agent.clone()).with_summary_config(config.summary.clone())
    }

    pub fn with_summary_config(mut self, summary_config: SummaryConfig) -> Self {
        self.summary_config = summary_config;
        let in_flight = self.summarizer.in_flight().clone();
        self.rebuild_summarizer(in_flight);
        self
    }

    /// Use `in_flight` as the compaction guard set.
    pub fn with_in_flight(mut self, in_flight: InFlightSet) -> Self {
        self.rebuild_summarizer(in_flight);
        self
    }

    pub fn with_assembler(mut self, assembler: Arc<dyn ContextAssembler>) -> Self {
        self.assembler = assembler;
        self
    }

    /// Use the default assembler with `identity`.
    pub fn with_identity(self, identity: Identity) -> Self {
        self.with_assembler(Arc::new(DefaultContextAssembler::new(identity)))
    }

    pub fn with_rate_gate(mut self, rate_gate: Arc<dyn RateGate>) -> Self {
        self.rate_gate = rate_gate;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Attach the bus used for `send_response` turns and by [`AgentLoop::run`].
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    fn rebuild_summarizer(&mut self, in_flight: InFlightSet) {
        self.summarizer = Arc::new(
            Summarizer::new(
                self.provider.clone(),
                self.sessions.clone(),
                self.config.model.clone(),
                self.config.context_window,
                self.summary_config.clone(),
            )
            .with_in_flight(in_flight),
        );
    }

    pub fn summarizer(&self) -> &Arc<Summarizer> {
        &self.summarizer
    }

    /// Whether the provider streams natively. When it does not, streamed
    /// turns still work but deliver the answer as one chunk.
    pub fn supports_streaming(&self) -> bool {
        self.provider.supports_streaming()
    }

    /// Tools and model, for startup logging.
    pub fn startup_info(&self) -> serde_json::Value {
        let names: Vec<String> = self.tools.definitions().into_iter().map(|d| d.name).collect();
        serde_json::json!({
            "tools": {
                "count": names.len(),
                "names": names,
            },
            "provider": self.provider.name(),
            "model": self.config.model,
            "streaming": self.supports_streaming(),
        })
    }

    /// Consume the bus until `shutdown` resolves or the inbound queue closes.
    ///
    /// Each message is handled to completion before the next is read. The
    /// reply (or `Error processing message: ...`) goes to the outbound
    /// queue; system turns, rate-limit notices included, have already
    /// delivered theirs.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let bus = self.bus.clone().ok_or_else(|| Error::Config {
            message: "agent loop has no message bus attached".into(),
        })?;
        tokio::pin!(shutdown);
        info!(model = %self.config.model, "Agent loop started");

        loop {
            let msg = tokio::select! {
                _ = &mut shutdown => {
                    info!("Agent loop shutting down");
                    break;
                }
                msg = bus.consume_inbound() => match msg {
                    Some(msg) => msg,
                    None => {
                        info!("Inbound queue closed, agent loop stopping");
                        break;
                    }
                },
            };

            let is_system = msg.is_system();
            let tenant_id = msg.tenant_id;
            let (channel, chat_id) = if is_system {
                parse_origin(&msg.chat_id)
            } else {
                (msg.channel.clone(), msg.chat_id.clone())
            };

            let response = match self.process_message(msg).await {
                Ok(_) if is_system => continue,
                Ok(response) => response,
                Err(e) => {
                    error!(channel = %channel, chat_id = %chat_id, error = %e, "Failed to process message");
                    format!("Error processing message: {e}")
                }
            };
            if response.is_empty() {
                continue;
            }

            let outbound = OutboundMessage {
                tenant_id,
                channel,
                chat_id,
                content: response,
            };
            if let Err(e) = bus.publish_outbound(outbound).await {
                warn!(error = %e, "Failed to publish response");
            }
        }

        Ok(())
    }

    /// Handle one bus message: rate check, then a user or system turn.
    pub async fn process_message(&self, msg: InboundMessage) -> Result<String> {
        self.dispatch(msg, TurnOverrides::default()).await
    }

    /// Run a turn on behalf of code (cron, CLI) rather than a chat surface.
    pub async fn process(&self, request: DirectRequest) -> Result<String> {
        let (msg, overrides) = Self::direct_turn(request, TurnHandlers::default(), false);
        self.dispatch(msg, overrides).await
    }

    /// Like [`AgentLoop::process`], pushing text and tool events to
    /// `handlers` as the turn runs.
    ///
    /// If the token handler returns an error the turn stops with
    /// [`Error::Cancelled`], which carries the text the handler accepted.
    pub async fn process_stream(&self, request: DirectRequest, handlers: TurnHandlers) -> Result<String> {
        let (msg, overrides) = Self::direct_turn(request, handlers, true);
        self.dispatch(msg, overrides).await
    }

    fn direct_turn(request: DirectRequest, handlers: TurnHandlers, stream: bool) -> (InboundMessage, TurnOverrides) {
        let mut msg = InboundMessage::new(request.channel, request.sender_id, request.chat_id, request.content)
            .with_session_key(request.session_key);
        msg.tenant_id = request.tenant_id;
        let overrides = TurnOverrides {
            model: request.model_override,
            exclude_tools: request.exclude_tools,
            handlers,
            stream,
        };
        (msg, overrides)
    }

    async fn dispatch(&self, msg: InboundMessage, overrides: TurnOverrides) -> Result<String> {
        let rate_key = match msg.tenant_id.filter(|id| *id > 0) {
            Some(id) => format!("user:{id}"),
            None => format!("user:{}", msg.sender_id),
        };
        if !self.rate_gate.allow(&rate_key) {
            warn!(sender_id = %msg.sender_id, key = %rate_key, "Rate limit exceeded for user");
            if msg.is_system() {
                // system turns deliver their own replies, the notice included
                let (channel, chat_id) = parse_origin(&msg.chat_id);
                self.publish(OutboundMessage {
                    tenant_id: msg.tenant_id.filter(|id| *id > 0),
                    channel,
                    chat_id,
                    content: RATE_LIMIT_MESSAGE.into(),
                })
                .await;
            }
            return Ok(RATE_LIMIT_MESSAGE.into());
        }

        info!(
            channel = %msg.channel,
            chat_id = %msg.chat_id,
            sender_id = %msg.sender_id,
            session_key = %msg.session_key,
            "Processing message from {}:{}: {}",
            msg.channel,
            msg.sender_id,
            preview(&msg.content, 80)
        );

        if msg.is_system() {
            return self.process_system_message(msg).await;
        }

        let opts = ProcessOptions {
            session: SessionKey::new(msg.session_key).with_tenant(msg.tenant_id),
            channel: msg.channel,
            chat_id: msg.chat_id,
            user_message: msg.content,
            media: msg.media,
            default_response: self.config.default_response.clone(),
            enable_summary: true,
            send_response: false,
            model_override: overrides.model,
            exclude_tools: overrides.exclude_tools,
            handlers: overrides.handlers,
        };
        self.run_agent_loop(opts, overrides.stream).await
    }

    /// A message from an internal component, answered in the session of
    /// the chat it names (`<channel>:<chat_id>`) and delivered there.
    async fn process_system_message(&self, msg: InboundMessage) -> Result<String> {
        let (channel, chat_id) = parse_origin(&msg.chat_id);
        info!(sender_id = %msg.sender_id, channel = %channel, chat_id = %chat_id, "Processing system message");

        let session = SessionKey::new(format!("{channel}:{chat_id}")).with_tenant(msg.tenant_id);
        let mut opts = ProcessOptions::new(
            session,
            channel,
            chat_id,
            format!("[System: {}] {}", msg.sender_id, msg.content),
        );
        opts.default_response = SYSTEM_DEFAULT_RESPONSE.into();
        opts.send_response = true;
        self.run_agent_loop(opts, false).await
    }

    /// One full turn: assemble context, iterate, persist, then compact and
    /// deliver as the options ask.
    async fn run_agent_loop(&self, opts: ProcessOptions, stream: bool) -> Result<String> {
        let started = Instant::now();

        let history = self.sessions.history(&opts.session).await;
        let summary = self.sessions.summary(&opts.session).await;
        let messages = self.assembler.build_messages(ContextInput {
            history: &history,
            summary: summary.as_deref(),
            user_text: &opts.user_message,
            media: &opts.media,
            channel: &opts.channel,
            chat_id: &opts.chat_id,
        });
        debug!(session_key = %opts.session, messages = messages.len(), "Context assembled");

        self.persist(&opts.session, Message::user(&opts.user_message)).await;

        let mut state = TurnState {
            messages,
            iterations: 0,
        };
        let result = self.run_iterations(&mut state, &opts, stream).await;
        let failure = result.as_ref().err().map(ToString::to_string);
        self.observer
            .record_agent_run(started.elapsed(), state.iterations, failure.as_deref());

        let mut content = result?;
        if content.is_empty() {
            content = opts.default_response.clone();
        }

        self.persist(&opts.session, Message::assistant(&content)).await;
        if let Err(e) = self.sessions.save(&opts.session).await {
            warn!(session_key = %opts.session, error = %e, "Failed to save session");
        }

        if opts.enable_summary && self.summarizer.maybe_summarize(&opts.session).await.is_some() {
            debug!(session_key = %opts.session, "Summarization scheduled");
        }

        if opts.send_response {
            self.deliver(&opts, &content).await;
        }

        info!(
            session_key = %opts.session,
            iterations = state.iterations,
            final_length = content.len(),
            "Response: {}",
            preview(&content, 120)
        );
        Ok(content)
    }

    async fn deliver(&self, opts: &ProcessOptions, content: &str) {
        self.publish(OutboundMessage {
            tenant_id: opts.session.tenant,
            channel: opts.channel.clone(),
            chat_id: opts.chat_id.clone(),
            content: content.to_string(),
        })
        .await;
    }

    async fn publish(&self, outbound: OutboundMessage) {
        let Some(bus) = &self.bus else {
            warn!(channel = %outbound.channel, chat_id = %outbound.chat_id, "No message bus attached, response not delivered");
            return;
        };
        if let Err(e) = bus.publish_outbound(outbound).await {
            warn!(error = %e, "Failed to publish response");
        }
    }
}

/// Split a system message's `<channel>:<chat_id>` target. Without a
/// separator (or with an empty channel) the target is the CLI.
fn parse_origin(chat_id: &str) -> (String, String) {
    match chat_id.split_once(':') {
        Some((channel, rest)) if !channel.is_empty() => (channel.to_string(), rest.to_string()),
        _ => ("cli".to_string(), chat_id.to_string()),
    }
}
