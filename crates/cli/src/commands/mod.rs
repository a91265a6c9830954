pub mod agent;
pub mod run;

use std::sync::Arc;

use pincer_agent::AgentLoop;
use pincer_config::{AppConfig, SessionBackend};
use pincer_core::bus::MessageBus;
use pincer_core::identity::Identity;
use pincer_core::session::SessionStore;
use pincer_providers::MockProvider;
use pincer_security::SlidingWindowLimiter;
use pincer_session::{FileSessionStore, InMemorySessionStore};
use pincer_telemetry::Metrics;
use tracing::info;

/// Everything a command needs, wired from one config.
pub struct Runtime {
    pub agent: Arc<AgentLoop>,
    pub bus: Arc<MessageBus>,
    pub metrics: Arc<Metrics>,
}

impl Runtime {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        Ok(Self::build(&config))
    }

    pub fn build(config: &AppConfig) -> Self {
        let bus = Arc::new(MessageBus::default());
        let metrics = Arc::new(Metrics::new());

        let provider = Arc::new(MockProvider::new().with_model(&config.agent.model).streaming());
        let sessions: Arc<dyn SessionStore> = match config.sessions.backend {
            SessionBackend::Memory => Arc::new(InMemorySessionStore::new()),
            SessionBackend::File => Arc::new(FileSessionStore::new(config.sessions_dir())),
        };
        let identity = Identity::load(&config.workspace_dir());
        info!(
            agent = %identity.name,
            context_files = identity.loaded_files.len(),
            backend = ?config.sessions.backend,
            "Runtime configured"
        );

        let agent = AgentLoop::from_config(
            provider,
            Arc::new(pincer_tools::default_registry(bus.clone())),
            sessions,
            config,
        )
        .with_identity(identity)
        .with_rate_gate(Arc::new(SlidingWindowLimiter::from_config(&config.rate_limit)))
        .with_observer(metrics.clone())
        .with_bus(bus.clone());

        Self {
            agent: Arc::new(agent),
            bus,
            metrics,
        }
    }

    /// Print every queued outbound message without waiting.
    pub async fn drain_outbound(&self) {
        while let Some(msg) = self.bus.try_consume_outbound().await {
            println!("  [{}:{}] {}", msg.channel, msg.chat_id, msg.content);
        }
    }
}
