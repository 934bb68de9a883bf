//! Mock implementations for testing.
//!
//! This module provides mock LLM clients, factories and embedders that can be
//! used across different test files without duplication.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use ragchain::llm::client::{LLMClientFactoryTrait, ModelParams, Provider};
use ragchain::llm::{LLMClient, LLMResponse};
use ragchain::rag::Embedder;
use ragchain::types::{AppError, Message, Result, ToolCall, ToolDefinition};
use std::collections::VecDeque;
use std::sync::Arc;

/// Mock LLM client for testing with configurable responses.
///
/// This client can be configured to return specific responses, tool calls,
/// or to simulate failures. It's useful for unit testing code that depends
/// on LLM responses without making actual API calls.
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    tool_calls: Vec<ToolCall>,
    should_fail: bool,
}

impl MockLLMClient {
    /// Create a new mock client that returns the given response.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            tool_calls: vec![],
            should_fail: false,
        }
    }

    /// Create a mock client that returns both a response and tool calls.
    pub fn with_tool_calls(response: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            response: response.to_string(),
            tool_calls,
            should_fail: false,
        }
    }

    /// Create a mock client that always returns an error.
    pub fn failing() -> Self {
        Self {
            response: String::new(),
            tool_calls: vec![],
            should_fail: true,
        }
    }

    fn reply(&self) -> Result<String> {
        if self.should_fail {
            return Err(AppError::LLM("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.reply()
    }

    async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.reply()
    }

    async fn generate_with_history(&self, _messages: &[Message]) -> Result<String> {
        self.reply()
    }

    async fn generate_with_tools(
        &self,
        _prompt: &str,
        _tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        let content = self.reply()?;
        let finish_reason = if self.tool_calls.is_empty() {
            "stop"
        } else {
            "tool_calls"
        };

        Ok(LLMResponse {
            content,
            tool_calls: self.tool_calls.clone(),
            finish_reason: finish_reason.to_string(),
            usage: None,
        })
    }

    async fn stream(
        &self,
        _prompt: &str,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>> {
        let response = self.reply()?;
        // Split response into chunks for streaming simulation
        let chunks: Vec<String> = response
            .chars()
            .collect::<Vec<_>>()
            .chunks(5)
            .map(|c| c.iter().collect())
            .collect();

        let stream = stream::iter(chunks.into_iter().map(Ok::<_, AppError>));
        Ok(Box::new(stream.boxed()))
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// One call seen by [`ScriptedLLMClient`].
#[derive(Debug, Clone)]
pub enum RecordedCall {
    Prompt(String),
    WithSystem { system: String, prompt: String },
    History(Vec<Message>),
}

/// Returns queued responses in order and records every call it receives.
///
/// Once the queue is empty each call fails, which makes an unexpected extra
/// model call visible in the test.
#[derive(Default)]
pub struct ScriptedLLMClient {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLLMClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Prompts of every call, with the last user message standing in for history calls.
    pub fn prompts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| match call {
                RecordedCall::Prompt(prompt) => prompt,
                RecordedCall::WithSystem { prompt, .. } => prompt,
                RecordedCall::History(messages) => messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }

    fn next(&self, call: RecordedCall) -> Result<String> {
        self.calls.lock().push(call);
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| AppError::LLM("No scripted response left".to_string()))
    }
}

#[async_trait]
impl LLMClient for ScriptedLLMClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.next(RecordedCall::Prompt(prompt.to_string()))
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.next(RecordedCall::WithSystem {
            system: system.to_string(),
            prompt: prompt.to_string(),
        })
    }

    async fn generate_with_history(&self, messages: &[Message]) -> Result<String> {
        self.next(RecordedCall::History(messages.to_vec()))
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        _tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        let content = self.next(RecordedCall::Prompt(prompt.to_string()))?;
        Ok(LLMResponse {
            content,
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: None,
        })
    }

    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>> {
        let response = self.next(RecordedCall::Prompt(prompt.to_string()))?;
        Ok(Box::new(stream::iter(vec![Ok::<_, AppError>(response)]).boxed()))
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

/// Mock LLM factory for tests requiring complete isolation from external services.
pub struct MockLLMFactory {
    provider: Provider,
    client: Arc<MockLLMClient>,
}

impl MockLLMFactory {
    /// Create a new mock factory that returns the given mock client.
    pub fn new(client: MockLLMClient) -> Self {
        Self {
            provider: Provider::OpenAI {
                api_key: "sk-mock".to_string(),
                api_base: "http://localhost:9".to_string(),
                model: "mock".to_string(),
                params: ModelParams::default(),
            },
            client: Arc::new(client),
        }
    }
}

impl LLMClientFactoryTrait for MockLLMFactory {
    fn default_provider(&self) -> &Provider {
        &self.provider
    }

    fn create_default(&self) -> Result<Box<dyn LLMClient>> {
        Ok(Box::new((*self.client).clone()))
    }

    fn create_with_provider(&self, _provider: Provider) -> Result<Box<dyn LLMClient>> {
        Ok(Box::new((*self.client).clone()))
    }
}

/// Deterministic bag-of-words embedder.
///
/// Each lower-cased word adds 1.0 to bucket `sum(bytes) % dimensions`, so
/// texts sharing words point in similar directions. The result is
/// L2-normalised unless it is all zeros.
pub struct MockEmbedder {
    dimensions: usize,
    requested: Mutex<usize>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            requested: Mutex::new(0),
        }
    }

    /// Number of texts embedded so far.
    pub fn requested(&self) -> usize {
        *self.requested.lock()
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let bucket = word.bytes().map(usize::from).sum::<usize>() % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        *self.requested.lock() += texts.len();
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_generate() {
        let client = MockLLMClient::new("test response");
        let result = client.generate("prompt").await;
        assert_eq!(result.unwrap(), "test response");
    }

    #[tokio::test]
    async fn test_mock_client_failing() {
        let client = MockLLMClient::failing();
        assert!(client.generate("prompt").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_factory() {
        let factory = MockLLMFactory::new(MockLLMClient::new("factory response"));
        let llm = factory.create_default().unwrap();
        assert_eq!(llm.generate("test").await.unwrap(), "factory response");
    }

    #[tokio::test]
    async fn test_scripted_client_runs_out() {
        let client = ScriptedLLMClient::new(["one"]);
        assert_eq!(client.generate("a").await.unwrap(), "one");
        assert!(client.generate("b").await.is_err());
        assert_eq!(client.prompts(), vec!["a", "b"]);
    }

    #[test]
    fn test_mock_embedder_is_normalised() {
        let embedder = MockEmbedder::new(8);
        let v = embedder.vector_for("autoencoders compress data");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embedder.vector_for("").iter().all(|x| *x == 0.0));
    }
}
