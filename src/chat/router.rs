//! Chat turn dispatcher
//!
//! Validates the request, classifies it, opens the selected agent's stream
//! and hands the caller a channel of [`ChatEvent`]s fed by a relay task.
//! The relay persists both turns once the stream ends, fails or is abandoned.

use crate::agents::{AgentInvoker, AgentRegistry};
use crate::chat::events::{ChatEvent, ChatRequest};
use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};
use crate::llm::provider::{LlmError, LlmProvider, TokenStream};
use crate::session::{SessionStore, Turn};
use crate::triage::{classifier_from_config, AgentLabel, Classifier};
use crate::{triage_span, turn_span, upstream_span};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Tunables for turn handling
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Retries after the first failed classification
    pub classify_retries: u32,
    pub retry_delay: Duration,
    /// Per-attempt classification timeout
    pub classify_timeout: Duration,
    /// Longest gap allowed between upstream chunks
    pub stream_idle_timeout: Duration,
    pub max_message_chars: usize,
    /// Events buffered between the relay and a slow caller
    pub event_buffer: usize,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            classify_retries: 1,
            retry_delay: Duration::from_millis(250),
            classify_timeout: Duration::from_secs(15),
            stream_idle_timeout: Duration::from_secs(60),
            max_message_chars: 8000,
            event_buffer: 64,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            classify_retries: config.triage.max_retries,
            retry_delay: Duration::from_millis(config.triage.retry_delay_ms),
            classify_timeout: Duration::from_secs(config.triage.timeout_secs),
            stream_idle_timeout: Duration::from_secs(config.chat.stream_idle_timeout_secs),
            max_message_chars: config.chat.max_message_chars,
            ..Default::default()
        }
    }
}

/// An accepted turn whose events are still being produced
#[derive(Debug)]
pub struct ChatTurn {
    pub session_id: String,
    pub agent: AgentLabel,
    pub events: mpsc::Receiver<ChatEvent>,
}

impl ChatTurn {
    /// Events as a stream; dropping it tells the relay the caller has gone
    pub fn into_stream(self) -> impl Stream<Item = ChatEvent> + Send + 'static {
        stream::unfold(self.events, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }
}

/// Wires classifier, agent invoker and session store together
pub struct ChatRouter {
    classifier: Arc<dyn Classifier>,
    invoker: Arc<AgentInvoker>,
    store: Arc<dyn SessionStore>,
    settings: RouterSettings,
}

impl ChatRouter {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        invoker: Arc<AgentInvoker>,
        store: Arc<dyn SessionStore>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            classifier,
            invoker,
            store,
            settings,
        }
    }

    /// Assemble a router from configuration around one hosted provider
    pub fn from_config(
        config: &RouterConfig,
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let classifier = classifier_from_config(config, provider.clone());
        let invoker = AgentInvoker::new(
            provider,
            AgentRegistry::from_config(config),
            config.llm.model.clone(),
        )
        .with_history_window(config.chat.history_window);

        Self::new(
            classifier,
            Arc::new(invoker),
            store,
            RouterSettings::from_config(config),
        )
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn invoker(&self) -> &Arc<AgentInvoker> {
        &self.invoker
    }

    /// Accept a chat message and start streaming the answer.
    ///
    /// Errors returned here happen before any event is produced: invalid
    /// input, or the classifier or agent being unreachable.
    pub async fn start_turn(&self, request: ChatRequest) -> RouterResult<ChatTurn> {
        let ChatRequest {
            message,
            session_id,
        } = request;
        let session_id = session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = turn_span!(session_id = %session_id);
        async move {
            let message = match self.validate(&message) {
                Ok(trimmed) => trimmed.to_string(),
                Err(e) => {
                    warn!(error = %e, "Rejected chat message");
                    return Err(e);
                }
            };
            let history = self.store.read(&session_id).await;
            debug!(history_turns = history.len(), "Loaded session history");

            let agent = self
                .classify_with_retry(&message, &history)
                .instrument(triage_span!(session_id = %session_id))
                .await?;

            let upstream = self
                .invoker
                .invoke(agent, &message, &history)
                .await
                .map_err(|e| {
                    log_llm_failure(&e, "Failed to open agent stream");
                    RouterError::service_unavailable(format!("Agent {agent} unavailable: {e}"))
                })?;

            let (tx, rx) = mpsc::channel(self.settings.event_buffer.max(1));
            let relay = Relay {
                session_id: session_id.clone(),
                agent,
                message,
                store: self.store.clone(),
                idle_timeout: self.settings.stream_idle_timeout,
            };
            tokio::spawn(
                relay
                    .run(upstream, tx)
                    .instrument(upstream_span!(session_id = %session_id, agent = %agent)),
            );

            info!(agent = %agent, "Turn accepted");
            Ok(ChatTurn {
                session_id,
                agent,
                events: rx,
            })
        }
        .instrument(span)
        .await
    }

    fn validate<'a>(&self, message: &'a str) -> RouterResult<&'a str> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(RouterError::invalid_input("Message must not be empty"));
        }
        let length = trimmed.chars().count();
        if length > self.settings.max_message_chars {
            return Err(RouterError::invalid_input(format!(
                "Message is {length} characters; the limit is {}",
                self.settings.max_message_chars
            )));
        }
        Ok(trimmed)
    }

    /// Classify, retrying after a fixed delay; exhaustion is `ServiceUnavailable`
    async fn classify_with_retry(&self, text: &str, history: &[Turn]) -> RouterResult<AgentLabel> {
        let attempts = self.settings.classify_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(
                self.settings.classify_timeout,
                self.classifier.classify(text, history),
            )
            .await
            .unwrap_or_else(|_| {
                Err(RouterError::LlmError(LlmError::Timeout(format!(
                    "classification took longer than {:?}",
                    self.settings.classify_timeout
                ))))
            });

            match outcome {
                Ok(label) => {
                    debug!(attempt, agent = %label, classifier = self.classifier.name(), "Classified");
                    return Ok(label);
                }
                Err(e) => {
                    match &e {
                        RouterError::LlmError(llm) => {
                            log_llm_failure(llm, "Classification attempt failed")
                        }
                        other => warn!(attempt, error = %other, "Classification attempt failed"),
                    }
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        error!(attempts, reason = %reason, "Classifier unavailable");
        Err(RouterError::service_unavailable(format!(
            "Classifier unavailable after {attempts} attempts: {reason}"
        )))
    }
}

fn log_llm_failure(error: &LlmError, context: &str) {
    if error.is_connectivity() {
        warn!(
            error = %error,
            "{context}; hosted model unreachable, check network restrictions such as private endpoints"
        );
    } else {
        warn!(error = %error, "{context}");
    }
}

#[derive(Debug)]
enum RelayOutcome {
    Completed,
    Failed(String),
    Disconnected,
}

/// Per-turn state owned by the relay task
struct Relay {
    session_id: String,
    agent: AgentLabel,
    message: String,
    store: Arc<dyn SessionStore>,
    idle_timeout: Duration,
}

impl Relay {
    async fn run(self, mut upstream: TokenStream, tx: mpsc::Sender<ChatEvent>) {
        let mut text = String::new();
        let mut chunks = 0usize;

        let outcome = if tx
            .send(ChatEvent::start(&self.session_id, self.agent))
            .await
            .is_err()
        {
            RelayOutcome::Disconnected
        } else {
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => break RelayOutcome::Disconnected,
                    next = tokio::time::timeout(self.idle_timeout, upstream.next()) => next,
                };

                match next {
                    Ok(Some(Ok(chunk))) => {
                        if chunk.is_empty() {
                            continue;
                        }
                        text.push_str(&chunk);
                        chunks += 1;
                        if tx
                            .send(ChatEvent::content(&self.session_id, chunk))
                            .await
                            .is_err()
                        {
                            break RelayOutcome::Disconnected;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        log_llm_failure(&e, "Upstream stream failed");
                        break RelayOutcome::Failed(e.to_string());
                    }
                    Ok(None) => break RelayOutcome::Completed,
                    Err(_) => {
                        break RelayOutcome::Failed(format!(
                            "No data from upstream for {:?}",
                            self.idle_timeout
                        ))
                    }
                }
            }
        };

        // Closes the upstream connection before persisting
        drop(upstream);

        let complete = matches!(outcome, RelayOutcome::Completed);
        self.store
            .append(&self.session_id, Turn::user(self.message.clone()))
            .await;
        self.store
            .append(&self.session_id, Turn::assistant(text, self.agent, complete))
            .await;

        match outcome {
            RelayOutcome::Completed => {
                info!(chunks, "Turn completed");
                let _ = tx.send(ChatEvent::end(&self.session_id)).await;
            }
            RelayOutcome::Failed(reason) => {
                warn!(chunks, reason = %reason, "Turn interrupted; stored as incomplete");
                let body = RouterError::stream_interrupted(reason).to_error_body();
                let _ = tx
                    .send(ChatEvent::error(&self.session_id, body.error))
                    .await;
            }
            RelayOutcome::Disconnected => {
                info!(chunks, "Caller disconnected; stored partial turn as incomplete");
            }
        }
    }
}
