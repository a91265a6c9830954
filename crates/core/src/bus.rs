//! Message bus: inbound and outbound envelopes between surfaces and the agent.
//!
//! Channels publish [`InboundMessage`]s; the agent loop is the single
//! consumer of the inbound queue and publishes [`OutboundMessage`]s that
//! channel adapters pick up.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};

use crate::error::ChannelError;

/// Channel tag for messages generated by internal components.
pub const SYSTEM_CHANNEL: &str = "system";

/// A message arriving from any surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Numeric user id from storage, when the surface knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<i64>,

    pub channel: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,

    pub session_key: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let channel = channel.into();
        let chat_id = chat_id.into();
        Self {
            session_key: format!("{channel}:{chat_id}"),
            channel,
            sender_id: sender_id.into(),
            chat_id,
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = session_key.into();
        self
    }

    pub fn is_system(&self) -> bool {
        self.channel == SYSTEM_CHANNEL
    }
}

/// A reply headed for a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<i64>,

    pub channel: String,
    pub chat_id: String,
    pub content: String,
}

/// Bounded inbound/outbound queues.
///
/// Receivers sit behind async mutexes so the bus can be shared by `Arc`
/// while keeping a single logical consumer per queue.
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
}

impl MessageBus {
    /// Create a bus whose queues each hold `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    pub async fn publish_inbound(&self, msg: InboundMessage) -> std::result::Result<(), ChannelError> {
        self.inbound_tx
            .send(msg)
            .await
            .map_err(|_| ChannelError::Closed("inbound".into()))
    }

    /// Wait for the next inbound message. `None` once every sender is gone.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        self.inbound_rx.lock().await.recv().await
    }

    pub async fn publish_outbound(&self, msg: OutboundMessage) -> std::result::Result<(), ChannelError> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| ChannelError::Closed("outbound".into()))
    }

    pub async fn consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Non-blocking outbound read, for drains and tests.
    pub async fn try_consume_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.try_recv().ok()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_defaults_session_key() {
        let msg = InboundMessage::new("telegram", "alice", "42", "hi");
        assert_eq!(msg.session_key, "telegram:42");
        assert!(!msg.is_system());
        assert!(InboundMessage::new(SYSTEM_CHANNEL, "cron", "cli:x", "done").is_system());
    }

    #[tokio::test]
    async fn inbound_round_trip_preserves_order() {
        let bus = MessageBus::new(4);
        bus.publish_inbound(InboundMessage::new("cli", "u", "c", "one")).await.unwrap();
        bus.publish_inbound(InboundMessage::new("cli", "u", "c", "two")).await.unwrap();

        assert_eq!(bus.consume_inbound().await.unwrap().content, "one");
        assert_eq!(bus.consume_inbound().await.unwrap().content, "two");
    }

    #[tokio::test]
    async fn outbound_try_consume_on_empty_queue() {
        let bus = MessageBus::default();
        assert!(bus.try_consume_outbound().await.is_none());

        bus.publish_outbound(OutboundMessage {
            tenant_id: None,
            channel: "cli".into(),
            chat_id: "direct".into(),
            content: "hello".into(),
        })
        .await
        .unwrap();
        assert_eq!(bus.try_consume_outbound().await.unwrap().content, "hello");
    }
}
