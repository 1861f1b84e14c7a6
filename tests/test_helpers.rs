//! Test helpers and utilities for integration tests

use std::sync::Arc;
use std::time::Duration;
use triage_router::agents::{AgentInvoker, AgentRegistry};
use triage_router::chat::{ChatEvent, ChatRouter, ChatTurn, RouterSettings};
use triage_router::config::RouterConfig;
use triage_router::session::{InMemorySessionStore, SessionStore};
use triage_router::testing::mocks::{MockClassifier, MockLlmProvider};
use triage_router::triage::{AgentLabel, Classifier};

/// Minimal valid configuration for integration tests
#[allow(dead_code)]
pub fn test_config() -> RouterConfig {
    RouterConfig::from_toml_str(
        r#"
[llm]
provider = "azure"
endpoint = "https://example.openai.azure.com"
api_key_env = "AZURE_OPENAI_API_KEY"
model = "gpt-4o"

[triage]
retry_delay_ms = 10
"#,
    )
    .expect("test config should parse")
}

/// Settings with short delays so failure paths finish quickly
#[allow(dead_code)]
pub fn fast_settings() -> RouterSettings {
    RouterSettings {
        retry_delay: Duration::from_millis(10),
        classify_timeout: Duration::from_millis(200),
        stream_idle_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

/// Router over a scripted classifier and provider, plus handles to inspect them
#[allow(dead_code)]
pub struct TestRouter {
    pub router: Arc<ChatRouter>,
    pub classifier: Arc<MockClassifier>,
    pub provider: Arc<MockLlmProvider>,
    pub store: Arc<InMemorySessionStore>,
}

#[allow(dead_code)]
pub fn test_router(classifier: MockClassifier, provider: MockLlmProvider) -> TestRouter {
    let classifier = Arc::new(classifier);
    let provider = Arc::new(provider);
    let store = Arc::new(InMemorySessionStore::new());

    let invoker = AgentInvoker::new(provider.clone(), AgentRegistry::builtin(), "gpt-4o".to_string());
    let router = ChatRouter::new(
        classifier.clone() as Arc<dyn Classifier>,
        Arc::new(invoker),
        store.clone() as Arc<dyn SessionStore>,
        fast_settings(),
    );

    TestRouter {
        router: Arc::new(router),
        classifier,
        provider,
        store,
    }
}

/// Router that sends everything to technical support and streams `chunks`
#[allow(dead_code)]
pub fn streaming_router(chunks: Vec<&str>) -> TestRouter {
    test_router(
        MockClassifier::returning(AgentLabel::TechnicalSupport),
        MockLlmProvider::streaming(chunks),
    )
}

/// Drain every event of a turn
#[allow(dead_code)]
pub async fn collect_events(turn: ChatTurn) -> Vec<ChatEvent> {
    let mut events = turn.events;
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    collected
}
