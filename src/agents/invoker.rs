//! Opens a streaming completion against the agent chosen by triage

use crate::agents::profile::{AgentProfile, AgentRegistry};
use crate::llm::provider::{CompletionRequest, LlmError, LlmProvider, Message, TokenStream};
use crate::session::Turn;
use crate::triage::AgentLabel;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Calls the hosted model on behalf of an agent profile
pub struct AgentInvoker {
    provider: Arc<dyn LlmProvider>,
    registry: AgentRegistry,
    default_model: String,
    history_window: usize,
}

impl AgentInvoker {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: AgentRegistry,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            registry,
            default_model: default_model.into(),
            history_window: 20,
        }
    }

    /// Limit how many earlier turns are forwarded as context
    pub fn with_history_window(mut self, history_window: usize) -> Self {
        self.history_window = history_window;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    /// Build the upstream request for one turn (pure function)
    pub fn build_request(
        &self,
        profile: &AgentProfile,
        message: &str,
        history: &[Turn],
    ) -> CompletionRequest {
        let start = history.len().saturating_sub(self.history_window);

        let mut messages = Vec::with_capacity(history.len() - start + 2);
        messages.push(Message::system(profile.instructions.clone()));
        messages.extend(history[start..].iter().map(Turn::to_message));
        messages.push(Message::user(message));

        let mut metadata = HashMap::new();
        metadata.insert("agent".to_string(), profile.label.to_string());

        CompletionRequest {
            model: profile
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages,
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
            metadata,
            ..Default::default()
        }
    }

    /// Open the agent's token stream for `message`
    pub async fn invoke(
        &self,
        label: AgentLabel,
        message: &str,
        history: &[Turn],
    ) -> Result<TokenStream, LlmError> {
        let profile = self.registry.get(label);
        let request = self.build_request(profile, message, history);

        debug!(
            agent = %label,
            model = %request.model,
            context_messages = request.messages.len(),
            "Opening agent stream"
        );

        let stream = self.provider.complete_stream(request).await?;
        info!(agent = %label, name = %profile.name, "Agent stream opened");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::MessageRole;
    use crate::testing::mocks::MockLlmProvider;
    use futures::StreamExt;

    fn invoker(provider: Arc<MockLlmProvider>) -> AgentInvoker {
        AgentInvoker::new(provider, AgentRegistry::builtin(), "gpt-4")
    }

    #[test]
    fn test_request_layout() {
        let invoker = invoker(Arc::new(MockLlmProvider::new(vec![])));
        let history = vec![
            Turn::user("earlier question"),
            Turn::assistant("earlier answer", AgentLabel::TechnicalSupport, true),
        ];
        let profile = invoker.registry().get(AgentLabel::Escalation).clone();

        let request = invoker.build_request(&profile, "refund please", &history);
        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[0].content, profile.instructions);
        assert_eq!(request.messages[1].content, "earlier question");
        assert_eq!(request.messages[2].role, MessageRole::Assistant);
        assert_eq!(request.messages[3].content, "refund please");
        assert_eq!(request.metadata["agent"], "escalation");
    }

    #[test]
    fn test_history_window_keeps_most_recent_turns() {
        let invoker = invoker(Arc::new(MockLlmProvider::new(vec![]))).with_history_window(1);
        let history = vec![Turn::user("old"), Turn::user("recent")];
        let profile = AgentProfile::builtin(AgentLabel::TechnicalSupport);

        let request = invoker.build_request(&profile, "now", &history);
        let contents: Vec<_> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["recent", "now"]);
    }

    #[test]
    fn test_profile_model_override() {
        let invoker = invoker(Arc::new(MockLlmProvider::new(vec![])));
        let mut profile = AgentProfile::builtin(AgentLabel::FoundrySupport);
        profile.model = Some("foundry-deployment".to_string());

        let request = invoker.build_request(&profile, "hi", &[]);
        assert_eq!(request.model, "foundry-deployment");
    }

    #[tokio::test]
    async fn test_invoke_streams_provider_chunks() {
        let provider = Arc::new(MockLlmProvider::streaming(vec!["I ", "can ", "help."]));
        let invoker = invoker(provider.clone());

        let stream = invoker
            .invoke(AgentLabel::TechnicalSupport, "help", &[])
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks, vec!["I ", "can ", "help."]);
        assert_eq!(provider.stream_calls(), 1);
        let request = provider.last_stream_request().unwrap();
        assert_eq!(request.messages.last().unwrap().content, "help");
    }
}
