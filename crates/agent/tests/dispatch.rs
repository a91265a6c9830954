//! Dispatcher behavior: admission, system messages, the bus loop and
//! background summarization.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use pincer_agent::{AgentLoop, DirectRequest, RATE_LIMIT_MESSAGE, SYSTEM_DEFAULT_RESPONSE};
use pincer_core::bus::{InboundMessage, MessageBus};
use pincer_core::error::ProviderError;
use pincer_core::message::{Message, Role};
use pincer_core::provider::{Provider, ProviderRequest, ProviderResponse};
use pincer_core::session::{Session, SessionKey, SessionStore};
use pincer_providers::MockProvider;
use pincer_security::SlidingWindowLimiter;
use pincer_session::InMemorySessionStore;
use tokio::sync::{Semaphore, oneshot};

#[tokio::test]
async fn rate_limited_sender_gets_notice_without_model_call() {
    let provider = Arc::new(ScriptedProvider::texts(&["first"]));
    let limiter = Arc::new(SlidingWindowLimiter::new(1, Duration::from_secs(60)));
    let agent = agent_with(provider.clone(), InMemorySessionStore::new()).with_rate_gate(limiter.clone());

    let first = agent.process(DirectRequest::new("one", "s").with_tenant(7)).await.unwrap();
    let second = agent.process(DirectRequest::new("two", "s").with_tenant(7)).await.unwrap();

    assert_eq!(first, "first");
    assert_eq!(second, RATE_LIMIT_MESSAGE);
    assert_eq!(provider.calls(), 1);
    assert_eq!(limiter.remaining("user:7"), Some(0));
    assert_eq!(limiter.remaining("user:cron"), Some(1));
}

#[tokio::test]
async fn senders_without_tenant_are_keyed_by_sender_id() {
    let provider = Arc::new(ScriptedProvider::texts(&["a", "b"]));
    let limiter = Arc::new(SlidingWindowLimiter::new(1, Duration::from_secs(60)));
    let agent = agent_with(provider.clone(), InMemorySessionStore::new()).with_rate_gate(limiter.clone());

    agent
        .process_message(InboundMessage::new("telegram", "alice", "1", "hi"))
        .await
        .unwrap();
    agent
        .process_message(InboundMessage::new("telegram", "bob", "2", "hi"))
        .await
        .unwrap();
    let third = agent
        .process_message(InboundMessage::new("telegram", "alice", "1", "again"))
        .await
        .unwrap();

    assert_eq!(third, RATE_LIMIT_MESSAGE);
    assert_eq!(provider.calls(), 2);
    assert_eq!(limiter.remaining("user:alice"), Some(0));
}

#[tokio::test]
async fn system_message_runs_in_origin_session_and_delivers() {
    let bus = Arc::new(MessageBus::new(8));
    let provider = Arc::new(ScriptedProvider::texts(&["Your report is ready."]));
    let store = InMemorySessionStore::new();
    let agent = agent_with(provider.clone(), store.clone()).with_bus(bus.clone());

    let response = agent
        .process_message(InboundMessage::new("system", "subagent", "telegram:42", "done"))
        .await
        .unwrap();
    assert_eq!(response, "Your report is ready.");

    let history = store.history(&SessionKey::new("telegram:42")).await;
    assert_eq!(history[0].content, "[System: subagent] done");
    assert_eq!(history[1].content, "Your report is ready.");

    // the system prompt names the origin chat
    let system_prompt = &provider.requests()[0].messages[0].content;
    assert!(system_prompt.contains("Channel: telegram"));
    assert!(system_prompt.contains("Chat ID: 42"));

    let sent = bus.try_consume_outbound().await.unwrap();
    assert_eq!((sent.channel.as_str(), sent.chat_id.as_str()), ("telegram", "42"));
    assert_eq!(sent.content, "Your report is ready.");
}

#[tokio::test]
async fn system_message_without_origin_goes_to_cli() {
    let bus = Arc::new(MessageBus::new(8));
    let provider = Arc::new(ScriptedProvider::texts(&[""]));
    let store = InMemorySessionStore::new();
    let agent = agent_with(provider, store.clone()).with_bus(bus.clone());

    let response = agent
        .process_message(InboundMessage::new("system", "cron", "nightly", "cleanup finished"))
        .await
        .unwrap();
    assert_eq!(response, SYSTEM_DEFAULT_RESPONSE);

    let history = store.history(&SessionKey::new("cli:nightly")).await;
    assert_eq!(history.len(), 2);

    let sent = bus.try_consume_outbound().await.unwrap();
    assert_eq!((sent.channel.as_str(), sent.chat_id.as_str()), ("cli", "nightly"));
    assert_eq!(sent.content, SYSTEM_DEFAULT_RESPONSE);
}

#[tokio::test]
async fn tenant_scopes_system_session_and_outbound() {
    let bus = Arc::new(MessageBus::new(8));
    let store = InMemorySessionStore::new();
    let agent = agent_with(Arc::new(ScriptedProvider::texts(&["ok"])), store.clone()).with_bus(bus.clone());

    agent
        .process_message(InboundMessage::new("system", "subagent", "slack:C1", "x").with_tenant(9))
        .await
        .unwrap();

    let scoped = SessionKey::new("slack:C1").with_tenant(Some(9));
    assert_eq!(store.history(&scoped).await.len(), 2);
    assert!(store.history(&SessionKey::new("slack:C1")).await.is_empty());
    assert_eq!(bus.try_consume_outbound().await.unwrap().tenant_id, Some(9));
}

#[tokio::test]
async fn rate_limited_system_message_notifies_origin() {
    let bus = Arc::new(MessageBus::new(8));
    let provider = Arc::new(ScriptedProvider::texts(&["first report"]));
    let limiter = Arc::new(SlidingWindowLimiter::new(1, Duration::from_secs(60)));
    let agent = Arc::new(
        agent_with(provider.clone(), InMemorySessionStore::new())
            .with_rate_gate(limiter)
            .with_bus(bus.clone()),
    );
    let (stop, handle) = spawn_run(agent);

    bus.publish_inbound(InboundMessage::new("system", "cron", "telegram:42", "one"))
        .await
        .unwrap();
    bus.publish_inbound(InboundMessage::new("system", "cron", "telegram:42", "two"))
        .await
        .unwrap();

    let first = bus.consume_outbound().await.unwrap();
    let second = bus.consume_outbound().await.unwrap();
    assert_eq!(first.content, "first report");
    assert_eq!((second.channel.as_str(), second.chat_id.as_str()), ("telegram", "42"));
    assert_eq!(second.content, RATE_LIMIT_MESSAGE);
    assert_eq!(provider.calls(), 1);

    drop(stop);
    handle.await.unwrap().unwrap();
    assert!(bus.try_consume_outbound().await.is_none());
}

/// Start `agent.run` on a task; dropping or sending on the returned
/// sender stops it.
fn spawn_run(agent: Arc<AgentLoop>) -> (oneshot::Sender<()>, tokio::task::JoinHandle<pincer_core::error::Result<()>>) {
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        agent
            .run(async move {
                let _ = rx.await;
            })
            .await
    });
    (tx, handle)
}

#[tokio::test]
async fn run_loop_publishes_user_replies() {
    let bus = Arc::new(MessageBus::new(8));
    let agent = Arc::new(
        agent_with(Arc::new(ScriptedProvider::texts(&["pong"])), InMemorySessionStore::new()).with_bus(bus.clone()),
    );
    let (stop, handle) = spawn_run(agent);

    bus.publish_inbound(InboundMessage::new("discord", "u1", "g1", "ping").with_tenant(3))
        .await
        .unwrap();
    let reply = bus.consume_outbound().await.unwrap();
    assert_eq!(reply.channel, "discord");
    assert_eq!(reply.chat_id, "g1");
    assert_eq!(reply.content, "pong");
    assert_eq!(reply.tenant_id, Some(3));

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn run_loop_reports_errors_to_the_chat() {
    let bus = Arc::new(MessageBus::new(8));
    let provider = Arc::new(ScriptedProvider::new(vec![
        Step::Fail(ProviderError::ApiError {
            status_code: 500,
            message: "upstream down".into(),
        }),
        Step::Reply(text_response("back")),
    ]));
    let agent = Arc::new(agent_with(provider, InMemorySessionStore::new()).with_bus(bus.clone()));
    let (stop, handle) = spawn_run(agent);

    bus.publish_inbound(InboundMessage::new("cli", "me", "direct", "hello"))
        .await
        .unwrap();
    let reply = bus.consume_outbound().await.unwrap();
    assert!(reply.content.starts_with("Error processing message: LLM call failed"));
    assert!(reply.content.contains("upstream down"));

    // the loop keeps serving after a failed turn
    bus.publish_inbound(InboundMessage::new("cli", "me", "direct", "again"))
        .await
        .unwrap();
    assert_eq!(bus.consume_outbound().await.unwrap().content, "back");

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn run_loop_does_not_republish_system_replies() {
    let bus = Arc::new(MessageBus::new(8));
    let agent = Arc::new(
        agent_with(
            Arc::new(ScriptedProvider::texts(&["task summary", "user reply"])),
            InMemorySessionStore::new(),
        )
        .with_bus(bus.clone()),
    );
    let (stop, handle) = spawn_run(agent);

    bus.publish_inbound(InboundMessage::new("system", "subagent", "telegram:42", "done"))
        .await
        .unwrap();
    bus.publish_inbound(InboundMessage::new("telegram", "u", "42", "thanks"))
        .await
        .unwrap();

    let first = bus.consume_outbound().await.unwrap();
    assert_eq!(first.content, "task summary");
    assert_eq!(first.chat_id, "42");
    // the next outbound is the user turn, not a second copy
    assert_eq!(bus.consume_outbound().await.unwrap().content, "user reply");

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn run_loop_stops_when_inbound_closes() {
    let bus = Arc::new(MessageBus::new(8));
    let agent = Arc::new(agent_with(Arc::new(ScriptedProvider::new(vec![])), InMemorySessionStore::new()).with_bus(bus));
    let (stop, handle) = spawn_run(agent);

    drop(stop);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("run returns after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn long_session_is_summarized_once_in_background() {
    let key = SessionKey::new("s");
    let mut session = Session::new(key.namespaced());
    for i in 0..25 {
        if i % 2 == 0 {
            session.push(Message::user(format!("question {i}")));
        } else {
            session.push(Message::assistant(format!("answer {i}")));
        }
    }
    let store = InMemorySessionStore::with_sessions([session]);
    let provider = Arc::new(MockProvider::new());
    let (registry, _) = test_registry();
    let agent = AgentLoop::new(provider.clone(), Arc::new(registry), Arc::new(store.clone()), config(5));

    let (a, b) = tokio::join!(
        agent.process(DirectRequest::new("turn one", "s")),
        agent.process(DirectRequest::new("turn two", "s")),
    );
    a.unwrap();
    b.unwrap();

    let mut summary = None;
    for _ in 0..200 {
        summary = store.summary(&key).await;
        if summary.is_some() && agent.summarizer().in_flight().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let summary = summary.expect("summary written");
    assert!(summary.starts_with("Mock response to: Merge these two conversation summaries"));
    // two turns, then two half summaries and one merge
    assert_eq!(provider.call_count(), 5);

    let history = store.history(&key).await;
    assert_eq!(history.len(), 4);
    assert_eq!(history.last().unwrap().role, Role::Assistant);
    assert!(agent.summarizer().in_flight().is_empty());
}

/// Answers like `MockProvider`, but summary calls wait for a permit.
struct HeldSummaries {
    inner: MockProvider,
    permits: Semaphore,
    waiting: std::sync::atomic::AtomicUsize,
}

#[async_trait::async_trait]
impl Provider for HeldSummaries {
    fn name(&self) -> &str {
        "held"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let prompt = &request.messages[0].content;
        if prompt.starts_with("Provide a concise summary") || prompt.starts_with("Merge these") {
            self.waiting.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let _permit = self.permits.acquire().await.unwrap();
        }
        self.inner.complete(request).await
    }
}

#[tokio::test]
async fn turn_during_summarization_keeps_its_messages() {
    let key = SessionKey::new("s");
    let mut session = Session::new(key.namespaced());
    for i in 0..25 {
        if i % 2 == 0 {
            session.push(Message::user(format!("question {i}")));
        } else {
            session.push(Message::assistant(format!("answer {i}")));
        }
    }
    let store = InMemorySessionStore::with_sessions([session]);
    let provider = Arc::new(HeldSummaries {
        inner: MockProvider::new(),
        permits: Semaphore::new(0),
        waiting: Default::default(),
    });
    let (registry, _) = test_registry();
    let agent = AgentLoop::new(provider.clone(), Arc::new(registry), Arc::new(store.clone()), config(5));

    agent.process(DirectRequest::new("turn one", "s")).await.unwrap();
    // let the background job read the history and block on its first call
    while provider.waiting.load(std::sync::atomic::Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    agent.process(DirectRequest::new("turn two", "s")).await.unwrap();
    provider.permits.add_permits(3);

    for _ in 0..200 {
        if store.summary(&key).await.is_some() && agent.summarizer().in_flight().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(store.summary(&key).await.is_some());

    let contents: Vec<String> = store.history(&key).await.into_iter().map(|m| m.content).collect();
    assert_eq!(
        contents,
        vec![
            "answer 23",
            "question 24",
            "turn one",
            "Mock response to: turn one",
            "turn two",
            "Mock response to: turn two",
        ]
    );
}
