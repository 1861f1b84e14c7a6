//! Mock implementations for testing
//!
//! Provides a scripted LlmProvider and Classifier so routing, streaming and
//! retry behaviour can be exercised without a hosted model.

use crate::error::RouterError;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, TokenStream,
    TokenUsage,
};
use crate::session::Turn;
use crate::triage::{AgentLabel, Classifier};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a mock stream does after its scripted chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamEnding {
    /// Ends cleanly
    #[default]
    Complete,
    /// Yields `StreamInterrupted` after this many chunks
    InterruptAfter(usize),
    /// Never yields again after this many chunks
    StallAfter(usize),
}

/// Mock LLM provider for testing
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    pub responses: Vec<String>,
    pub stream_chunks: Vec<String>,
    pub stream_ending: StreamEnding,
    /// Every `complete` call fails
    pub should_fail: bool,
    /// Only the first N `complete` calls fail
    pub fail_first: usize,
    /// Delay applied before each `complete` answer
    pub complete_delay: Option<Duration>,
    /// `complete_stream` fails before yielding anything
    pub stream_open_fails: bool,
    complete_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    last_stream_request: Mutex<Option<CompletionRequest>>,
    stream_dropped: Arc<AtomicBool>,
}

impl MockLlmProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Default::default()
        }
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn single_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Provider whose streams yield `chunks` in order
    pub fn streaming(chunks: Vec<&str>) -> Self {
        Self {
            stream_chunks: chunks.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    pub fn with_responses(mut self, responses: Vec<&str>) -> Self {
        self.responses = responses.into_iter().map(str::to_string).collect();
        self
    }

    pub fn interrupt_after(mut self, chunks: usize) -> Self {
        self.stream_ending = StreamEnding::InterruptAfter(chunks);
        self
    }

    pub fn stall_after(mut self, chunks: usize) -> Self {
        self.stream_ending = StreamEnding::StallAfter(chunks);
        self
    }

    pub fn failing_first(mut self, failures: usize) -> Self {
        self.fail_first = failures;
        self
    }

    pub fn with_complete_delay(mut self, delay: Duration) -> Self {
        self.complete_delay = Some(delay);
        self
    }

    pub fn with_stream_open_failure(mut self) -> Self {
        self.stream_open_fails = true;
        self
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Total upstream calls of either kind
    pub fn total_calls(&self) -> usize {
        self.complete_calls() + self.stream_calls()
    }

    pub fn last_stream_request(&self) -> Option<CompletionRequest> {
        self.last_stream_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// True once a stream handed out by this provider has been dropped
    pub fn stream_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }
}

/// Flags the provider when the stream that owns it is dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct MockStreamState {
    chunks: VecDeque<String>,
    yielded: usize,
    ending: StreamEnding,
    done: bool,
    _flag: DropFlag,
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let call = self.complete_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.complete_delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail || call < self.fail_first {
            return Err(LlmError::RequestFailed("Mock LLM failure".to_string()));
        }

        let content = if self.responses.is_empty() {
            "Mock response".to_string()
        } else {
            self.responses[call % self.responses.len()].clone()
        };

        Ok(CompletionResponse {
            content: Some(content),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: FinishReason::Stop,
            metadata: HashMap::new(),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TokenStream, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_stream_request.lock() {
            *last = Some(request);
        }

        if self.stream_open_fails {
            return Err(LlmError::NetworkError("Mock connection refused".to_string()));
        }

        let state = MockStreamState {
            chunks: self.stream_chunks.iter().cloned().collect(),
            yielded: 0,
            ending: self.stream_ending,
            done: false,
            _flag: DropFlag(self.stream_dropped.clone()),
        };

        let stream = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }

            match state.ending {
                StreamEnding::InterruptAfter(n) if state.yielded >= n => {
                    state.done = true;
                    return Some((
                        Err(LlmError::StreamInterrupted(
                            "Mock upstream closed mid-stream".to_string(),
                        )),
                        state,
                    ));
                }
                StreamEnding::StallAfter(n) if state.yielded >= n => {
                    futures::future::pending::<()>().await;
                }
                _ => {}
            }

            let chunk = state.chunks.pop_front()?;
            state.yielded += 1;
            Some((Ok(chunk), state))
        });

        Ok(stream.boxed())
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.should_fail {
            Err(LlmError::RequestFailed(
                "Mock health check failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Scripted classifier that counts calls
#[derive(Debug)]
pub struct MockClassifier {
    label: AgentLabel,
    fail_first: usize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn returning(label: AgentLabel) -> Self {
        Self {
            label,
            fail_first: 0,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every call
    pub fn always_failing() -> Self {
        Self::returning(AgentLabel::DEFAULT).failing_first(usize::MAX)
    }

    pub fn failing_first(mut self, failures: usize) -> Self {
        self.fail_first = failures;
        self
    }

    /// Sleeps before answering, to trip the router's classification timeout
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(&self, _text: &str, _history: &[Turn]) -> Result<AgentLabel, RouterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if call < self.fail_first {
            return Err(RouterError::LlmError(LlmError::Timeout(
                "Mock classifier timeout".to_string(),
            )));
        }
        Ok(self.label)
    }
}
