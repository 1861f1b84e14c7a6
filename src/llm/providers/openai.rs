//! OpenAI-compatible provider implementation
//!
//! Speaks the chat-completions wire format against either Azure OpenAI
//! (deployment-scoped URLs, `api-key` header) or the public OpenAI API
//! (bearer token). Supports both whole responses and SSE token streams.

use crate::config::{LlmSection, ProviderKind};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, Message,
    MessageRole, ResponseFormat, TokenStream, TokenUsage,
};
use crate::llm::sse::{SseDecoder, SseEvent};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Which flavour of the chat-completions API to talk to
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFlavor {
    /// `{base_url}/chat/completions` with a bearer token
    OpenAi,
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`
    Azure { api_version: String },
}

/// OpenAI provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub flavor: ApiFlavor,
    /// Transport-level retries for non-streaming calls
    pub max_retries: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(60),
            flavor: ApiFlavor::OpenAi,
            max_retries: 2,
        }
    }
}

impl OpenAiConfig {
    /// Configuration for an Azure OpenAI resource endpoint
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: endpoint.into(),
            flavor: ApiFlavor::Azure {
                api_version: api_version.into(),
            },
            ..Default::default()
        }
    }
}

impl OpenAiConfig {
    /// Client settings for a `[llm]` section; the key is resolved by the caller
    pub fn from_section(section: &LlmSection, api_key: String) -> Self {
        let flavor = match section.provider {
            ProviderKind::Azure => ApiFlavor::Azure {
                api_version: section.api_version.clone(),
            },
            ProviderKind::OpenAi => ApiFlavor::OpenAi,
        };

        Self {
            api_key,
            base_url: section.endpoint.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
            flavor,
            max_retries: section.max_retries,
        }
    }
}

/// OpenAI-compatible provider implementation
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    /// Create a new provider
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::NotConfigured(
                "OpenAI API key is required".to_string(),
            ));
        }
        if config.base_url.is_empty() {
            return Err(LlmError::NotConfigured(
                "OpenAI endpoint is required".to_string(),
            ));
        }

        // The overall timeout is applied per request so streams are not cut
        // off mid-answer; the relay enforces its own idle timeout.
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Chat completions URL for a model or deployment (pure function)
    fn completions_url(base_url: &str, flavor: &ApiFlavor, model: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match flavor {
            ApiFlavor::OpenAi => format!("{base}/chat/completions"),
            ApiFlavor::Azure { api_version } => format!(
                "{base}/openai/deployments/{model}/chat/completions?api-version={api_version}"
            ),
        }
    }

    /// Model listing URL used for health checks (pure function)
    fn models_url(base_url: &str, flavor: &ApiFlavor) -> String {
        let base = base_url.trim_end_matches('/');
        match flavor {
            ApiFlavor::OpenAi => format!("{base}/models"),
            ApiFlavor::Azure { api_version } => {
                format!("{base}/openai/models?api-version={api_version}")
            }
        }
    }

    /// Attach credentials in the style the flavour expects
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.config.flavor {
            ApiFlavor::OpenAi => {
                builder.header("Authorization", format!("Bearer {}", self.config.api_key))
            }
            ApiFlavor::Azure { .. } => builder.header("api-key", &self.config.api_key),
        }
    }

    /// Estimate token count for messages (pure function)
    fn estimate_token_count(messages: &[OpenAiMessage]) -> usize {
        messages.iter().map(|m| m.content.len() / 4).sum()
    }

    /// Convert completion request to wire format (pure function)
    fn convert_to_openai_request(request: &CompletionRequest, stream: bool) -> OpenAiCompletionRequest {
        let response_format = request.response_format.as_ref().map(|rf| match rf {
            ResponseFormat::Text => OpenAiResponseFormat::Simple {
                format_type: "text".to_string(),
            },
            ResponseFormat::Json => OpenAiResponseFormat::Simple {
                format_type: "json_object".to_string(),
            },
            ResponseFormat::JsonSchema { json_schema } => OpenAiResponseFormat::JsonSchema {
                format_type: "json_schema".to_string(),
                json_schema: OpenAiJsonSchema {
                    name: json_schema.name.clone(),
                    strict: json_schema.strict,
                    schema: json_schema.schema.clone(),
                },
            },
        });

        OpenAiCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format,
            stream: stream.then_some(true),
        }
    }

    /// Parse a whole completion response (pure function)
    fn parse_completion_response(
        openai_response: OpenAiCompletionResponse,
        request_metadata: HashMap<String, String>,
    ) -> Result<CompletionResponse, LlmError> {
        let choice = openai_response.choices.into_iter().next().ok_or_else(|| {
            LlmError::InvalidResponse("No choices returned from OpenAI".to_string())
        })?;

        let usage = openai_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content,
            model: openai_response.model,
            usage,
            finish_reason: Self::convert_finish_reason_pure(choice.finish_reason),
            metadata: request_metadata,
        })
    }

    /// Convert finish reason to internal format (pure function)
    fn convert_finish_reason_pure(reason: Option<String>) -> FinishReason {
        match reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Error,
        }
    }

    /// Convert internal message to wire format (pure function)
    fn convert_message(message: &Message) -> OpenAiMessage {
        OpenAiMessage {
            role: match message.role {
                MessageRole::System => "system".to_string(),
                MessageRole::User => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
            },
            content: message.content.clone(),
        }
    }

    /// Map a transport error to a provider error (pure function)
    fn map_send_error(e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(e.to_string())
        } else {
            LlmError::NetworkError(format!(
                "HTTP request failed: {} (is_connect: {}, is_request: {})",
                e,
                e.is_connect(),
                e.is_request()
            ))
        }
    }

    /// Map a non-success status to a provider error (pure function)
    fn map_status_error(status: StatusCode, body: &str) -> LlmError {
        match status {
            StatusCode::UNAUTHORIZED => {
                LlmError::AuthenticationFailed(format!("OpenAI API error: {status} - {body}"))
            }
            StatusCode::NOT_FOUND => {
                LlmError::ModelNotFound(format!("OpenAI API error: {status} - {body}"))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                LlmError::RateLimitExceeded(format!("OpenAI API error: {status} - {body}"))
            }
            s if s.is_server_error() => {
                LlmError::ApiError(format!("OpenAI API server error: {status} - {body}"))
            }
            _ => LlmError::ApiError(format!("OpenAI API error: {status} - {body}")),
        }
    }

    /// Check if error should trigger retry (pure)
    fn should_retry(error: &LlmError) -> bool {
        match error {
            LlmError::NetworkError(_) | LlmError::Timeout(_) => true,
            LlmError::RateLimitExceeded(_) => true,
            LlmError::ApiError(msg) => msg.contains("server error"),
            _ => false,
        }
    }

    /// Send a request and fail on non-success status (impure I/O)
    async fn send(&self, openai_request: &OpenAiCompletionRequest) -> Result<reqwest::Response, LlmError> {
        let url = Self::completions_url(
            &self.config.base_url,
            &self.config.flavor,
            &openai_request.model,
        );

        let mut builder = self
            .authorize(self.client.post(url))
            .header("Content-Type", "application/json")
            .json(openai_request);
        if openai_request.stream.is_none() {
            builder = builder.timeout(self.config.timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| {
                let err = Self::map_send_error(e);
                warn!("OpenAI network error details: {}", err);
                err
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            warn!("OpenAI server error: {} - {}", status, error_text);
        } else {
            error!(
                "OpenAI API client error - Status: {}, Response: {}",
                status, error_text
            );
            if error_text.contains("maximum context length") {
                warn!("Token limit exceeded - conversation may be too long");
            }
        }
        Err(Self::map_status_error(status, &error_text))
    }

    /// Retry orchestrator for whole-response calls (impure)
    async fn complete_with_retry(
        &self,
        openai_request: OpenAiCompletionRequest,
        metadata: HashMap<String, String>,
    ) -> Result<CompletionResponse, LlmError> {
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * u64::from(attempt));
                debug!("OpenAI retry attempt {} after {:?} delay", attempt, delay);
                tokio::time::sleep(delay).await;
            }

            let result = match self.send(&openai_request).await {
                Ok(response) => response
                    .json::<OpenAiCompletionResponse>()
                    .await
                    .map_err(|e| LlmError::InvalidResponse(e.to_string())),
                Err(e) => Err(e),
            };

            match result {
                Ok(openai_response) => {
                    if attempt > 0 {
                        debug!("OpenAI request succeeded after {} retries", attempt);
                    }
                    let response = Self::parse_completion_response(openai_response, metadata)?;
                    self.log_response_info(&response);
                    return Ok(response);
                }
                Err(e) => {
                    warn!("OpenAI request attempt {} failed: {}", attempt + 1, e);
                    if !Self::should_retry(&e) || attempt >= self.config.max_retries {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Log response information (impure)
    fn log_response_info(&self, response: &CompletionResponse) {
        debug!(
            "OpenAI response: {} tokens used (prompt: {}, completion: {}), finish_reason: {:?}",
            response.usage.total_tokens,
            response.usage.prompt_tokens,
            response.usage.completion_tokens,
            response.finish_reason,
        );
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        match self.config.flavor {
            ApiFlavor::OpenAi => "openai",
            ApiFlavor::Azure { .. } => "azure-openai",
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let openai_request = Self::convert_to_openai_request(&request, false);
        debug!(
            "OpenAI request: {} messages, estimated ~{} tokens",
            openai_request.messages.len(),
            Self::estimate_token_count(&openai_request.messages)
        );

        self.complete_with_retry(openai_request, request.metadata)
            .await
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TokenStream, LlmError> {
        let openai_request = Self::convert_to_openai_request(&request, true);
        debug!(
            "OpenAI streaming request: {} messages, estimated ~{} tokens",
            openai_request.messages.len(),
            Self::estimate_token_count(&openai_request.messages)
        );

        // A stream cannot be replayed once chunks were handed out, so no retries here
        let response = self.send(&openai_request).await?;
        Ok(token_stream(response.bytes_stream().boxed()))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        let url = Self::models_url(&self.config.base_url, &self.config.flavor);
        let response = self
            .authorize(self.client.get(url))
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LlmError::AuthenticationFailed(format!(
                "OpenAI API health check failed with status {}",
                response.status()
            )))
        }
    }
}

/// State threaded through the token stream
struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    saw_done: bool,
    finished: bool,
}

impl StreamState {
    fn apply(&mut self, event: SseEvent) {
        match event {
            SseEvent::Done => {
                self.saw_done = true;
                self.finished = true;
            }
            SseEvent::Data(payload) => match serde_json::from_str::<OpenAiStreamChunk>(&payload) {
                Ok(chunk) => {
                    if let Some(api_error) = chunk.error {
                        self.pending
                            .push_back(Err(LlmError::ApiError(api_error.message)));
                        self.finished = true;
                        return;
                    }
                    for choice in chunk.choices {
                        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                            self.pending.push_back(Ok(content));
                        }
                    }
                }
                Err(e) => {
                    self.pending.push_back(Err(LlmError::InvalidResponse(format!(
                        "Malformed stream chunk: {e}"
                    ))));
                    self.finished = true;
                }
            },
        }
    }
}

/// Turn a raw SSE byte stream into text chunks.
///
/// Reading happens only when the consumer polls, and the byte stream is
/// dropped together with the returned stream.
fn token_stream(bytes: BoxStream<'static, reqwest::Result<Bytes>>) -> TokenStream {
    let state = StreamState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        saw_done: false,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    for event in state.decoder.push(&bytes) {
                        state.apply(event);
                        if state.finished {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("OpenAI stream read failed: {}", e);
                    state.finished = true;
                    state
                        .pending
                        .push_back(Err(LlmError::StreamInterrupted(e.to_string())));
                }
                None => {
                    if let Some(event) = state.decoder.finish() {
                        state.apply(event);
                    }
                    if !state.saw_done && !state.finished {
                        state.pending.push_back(Err(LlmError::StreamInterrupted(
                            "upstream closed the stream before [DONE]".to_string(),
                        )));
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[derive(Debug, Serialize)]
struct OpenAiCompletionRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<OpenAiResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiCompletionResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    error: Option<OpenAiStreamError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamError {
    #[serde(default)]
    message: String,
}

/// OpenAI response format
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAiResponseFormat {
    Simple {
        #[serde(rename = "type")]
        format_type: String,
    },
    JsonSchema {
        #[serde(rename = "type")]
        format_type: String,
        json_schema: OpenAiJsonSchema,
    },
}

#[derive(Debug, Serialize)]
struct OpenAiJsonSchema {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    strict: Option<bool>,
    schema: serde_json::Value,
}
