//! Classifiers that assign an incoming message to an agent
//!
//! The production classifier is itself a hosted model call; the rule-based
//! and fixed classifiers cover agentless deployments and tests.

use crate::config::{RouterConfig, TriageStrategy};
use crate::error::RouterError;
use crate::llm::provider::{CompletionRequest, LlmProvider, Message, ResponseFormat};
use crate::session::{Turn, TurnRole};
use crate::triage::label::AgentLabel;
use crate::triage::schema::TriageDecisionOutput;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pluggable triage capability
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name used in logs and the health endpoint
    fn name(&self) -> &str;

    /// Pick the agent for `text`, optionally informed by earlier turns.
    ///
    /// Errors mean the classifier could not be consulted at all; output that
    /// cannot be understood resolves to [`AgentLabel::DEFAULT`] instead.
    async fn classify(&self, text: &str, history: &[Turn]) -> Result<AgentLabel, RouterError>;
}

const TRIAGE_SYSTEM_PROMPT: &str = r#"You are an orchestrator that evaluates user requests about Microsoft Azure and routes each one to the specialized agent best suited to answer it.

Route to "technical-support" for:
- Technical issues with Azure services
- Configuration and setup questions
- Error message resolution
- Best practices consultation
- Performance issue diagnosis

Route to "foundry-support" for:
- Azure AI Foundry projects, hubs and deployments
- Azure AI Agent Service and prompt flow
- Model catalog, fine-tuning and evaluation in Foundry

Route to "escalation" for:
- Billing and account-related issues
- Highly complex technical issues requiring specialized expertise
- SLA violations or emergency situations
- Cases requiring enterprise-level support
- Custom development consultations

Reply with a single JSON object and nothing else:
{"agent": "<technical-support|foundry-support|escalation>", "reasoning": "<one sentence>"}"#;

/// Classifier backed by a hosted chat model
pub struct LlmClassifier {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    history_window: usize,
    structured_output: bool,
}

impl LlmClassifier {
    /// Create a new LLM-based classifier
    pub fn new(provider: Arc<dyn LlmProvider>, model: String) -> Self {
        Self {
            provider,
            model,
            temperature: 0.0,
            history_window: 6,
            structured_output: false,
        }
    }

    /// Classifier with custom temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Limit how many earlier turns are shown to the model
    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    /// Ask for the schema-constrained format rather than plain JSON mode
    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.structured_output = enabled;
        self
    }

    /// Render the tail of the conversation for the triage prompt (pure function)
    fn format_history(history: &[Turn], window: usize) -> String {
        let start = history.len().saturating_sub(window);
        let recent = &history[start..];
        if recent.is_empty() {
            return "No earlier conversation.".to_string();
        }

        let mut output = String::from("EARLIER CONVERSATION:\n");
        for turn in recent {
            let speaker = match turn.role {
                TurnRole::User => "user".to_string(),
                TurnRole::Assistant => match turn.agent {
                    Some(agent) => format!("assistant ({agent})"),
                    None => "assistant".to_string(),
                },
            };
            output.push_str(&format!("- {speaker}: {}\n", truncate_chars(&turn.content, 300)));
        }
        output
    }

    /// Build the classification request (pure function)
    fn build_request(&self, text: &str, history: &[Turn]) -> CompletionRequest {
        let prompt = format!(
            "{}\n\nLATEST USER MESSAGE:\n{}\n\nWhich agent should answer? Reply in JSON.",
            Self::format_history(history, self.history_window),
            text
        );

        CompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::system(TRIAGE_SYSTEM_PROMPT), Message::user(prompt)],
            temperature: Some(self.temperature),
            max_tokens: Some(150),
            response_format: Some(if self.structured_output {
                TriageDecisionOutput::response_format()
            } else {
                ResponseFormat::Json
            }),
            ..Default::default()
        }
    }

    /// Interpret the model's reply (pure function)
    fn interpret(content: Option<&str>) -> AgentLabel {
        let Some(content) = content else {
            warn!("Classifier returned no content, using default agent");
            return AgentLabel::DEFAULT;
        };

        if let Ok(decision) = serde_json::from_str::<TriageDecisionOutput>(content.trim()) {
            debug!(
                agent = %decision.agent,
                reasoning = %decision.reasoning,
                "Parsed structured triage decision"
            );
            return decision.agent;
        }

        match AgentLabel::try_parse_lenient(content) {
            Some(label) => label,
            None => {
                warn!(
                    response = %truncate_chars(content, 200),
                    "Unparseable classifier output, using default agent"
                );
                AgentLabel::DEFAULT
            }
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        "llm"
    }

    async fn classify(&self, text: &str, history: &[Turn]) -> Result<AgentLabel, RouterError> {
        let request = self.build_request(text, history);

        let response = self.provider.complete(request).await?;
        let label = Self::interpret(response.content.as_deref());

        info!(agent = %label, provider = self.provider.name(), "Classified message");
        Ok(label)
    }
}

/// Deterministic keyword rules, for deployments without a triage model
#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

const ESCALATION_KEYWORDS: &[&str] = &[
    "billing",
    "invoice",
    "refund",
    "charge",
    "subscription cost",
    "account locked",
    "sla violation",
    "outage",
    "urgent",
    "emergency",
    "enterprise support",
    "contract",
];

const FOUNDRY_KEYWORDS: &[&str] = &[
    "foundry",
    "ai studio",
    "agent service",
    "prompt flow",
    "model catalog",
    "fine-tun",
];

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Pure keyword match; Foundry wins over escalation when both match
    pub fn classify_text(text: &str) -> AgentLabel {
        let lowered = text.to_lowercase();
        if FOUNDRY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            AgentLabel::FoundrySupport
        } else if ESCALATION_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            AgentLabel::Escalation
        } else {
            AgentLabel::DEFAULT
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(&self, text: &str, _history: &[Turn]) -> Result<AgentLabel, RouterError> {
        Ok(Self::classify_text(text))
    }
}

/// Sends every message to one agent (agentless mode)
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    label: AgentLabel,
}

impl FixedClassifier {
    pub fn new(label: AgentLabel) -> Self {
        Self { label }
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn classify(&self, _text: &str, _history: &[Turn]) -> Result<AgentLabel, RouterError> {
        Ok(self.label)
    }
}

/// Build the classifier selected by `[triage] strategy`
pub fn classifier_from_config(
    config: &RouterConfig,
    provider: Arc<dyn LlmProvider>,
) -> Arc<dyn Classifier> {
    match config.triage.strategy {
        TriageStrategy::Llm => Arc::new(
            LlmClassifier::new(provider, config.triage_model().to_string())
                .with_temperature(config.triage.temperature)
                .with_history_window(config.triage.history_window)
                .with_structured_output(config.triage.structured_output),
        ),
        TriageStrategy::Keyword => Arc::new(KeywordClassifier::new()),
        TriageStrategy::Fixed => Arc::new(FixedClassifier::new(config.triage.fixed_agent)),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
