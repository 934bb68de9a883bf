//! LLM client abstractions and provider management
//!
//! Every model call in the crate goes through [`LLMClient`], so chains, chat
//! memory and the tool router work the same against the real OpenAI client
//! and the mocks used in tests.

use crate::types::{Message, Result, ToolCall, ToolDefinition};
use crate::utils::config::Config;
use crate::utils::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion from a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with conversation history
    async fn generate_with_history(&self, messages: &[Message]) -> Result<String>;

    /// Generate with tool calling support
    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse>;

    /// Stream a completion
    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Response from an LLM generation request
#[derive(Debug, Clone)]
pub struct LLMResponse {
    /// The text content of the response
    pub content: String,
    /// Any tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    /// The reason generation stopped (e.g., "stop", "tool_calls", "length")
    pub finish_reason: String,
    /// Token usage, when the provider reports it
    pub usage: Option<TokenUsage>,
}

/// Sampling parameters forwarded with every request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// Provider enum for runtime selection
///
/// Only OpenAI-compatible Chat Completions endpoints are supported. Pointing
/// `api_base` at another compatible server (Azure, OpenRouter, a local
/// gateway) works without code changes.
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    ///     params: ModelParams::default(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
        params: ModelParams,
    },
}

impl Provider {
    /// Build the provider described by `config`.
    ///
    /// Fails when `OPENAI_API_KEY` is not available.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Provider::OpenAI {
            api_key: config.openai_api_key()?,
            api_base: config.llm.api_base.clone(),
            model: config.llm.model.clone(),
            params: ModelParams {
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
                timeout_secs: Some(config.llm.request_timeout_secs),
            },
        })
    }

    /// Create a client instance for this provider
    pub fn create_client(&self, retry: RetryPolicy) -> Result<Box<dyn LLMClient>> {
        match self {
            Provider::OpenAI {
                api_key,
                api_base,
                model,
                params,
            } => Ok(Box::new(
                super::openai::OpenAIClient::new(api_key.clone(), api_base.clone(), model.clone())
                    .with_params(params.clone())?
                    .with_retry(retry),
            )),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
        }
    }

    /// Model identifier configured for this provider
    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } => model,
        }
    }
}

/// Trait for factories handing out LLM clients
pub trait LLMClientFactoryTrait: Send + Sync {
    /// Get the default provider
    fn default_provider(&self) -> &Provider;

    /// Create a client using the default provider
    fn create_default(&self) -> Result<Box<dyn LLMClient>>;

    /// Create a client using a specific provider
    fn create_with_provider(&self, provider: Provider) -> Result<Box<dyn LLMClient>>;
}

/// Configuration-based client factory
///
/// Holds the default provider and the retry policy every client it builds
/// shares.
pub struct LLMClientFactory {
    default_provider: Provider,
    retry: RetryPolicy,
}

impl LLMClientFactory {
    /// Create a new factory with the specified default provider
    pub fn new(default_provider: Provider) -> Self {
        Self {
            default_provider,
            retry: RetryPolicy::default(),
        }
    }

    /// Build a factory from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            default_provider: Provider::from_config(config)?,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl LLMClientFactoryTrait for LLMClientFactory {
    fn default_provider(&self) -> &Provider {
        &self.default_provider
    }

    fn create_default(&self) -> Result<Box<dyn LLMClient>> {
        self.default_provider.create_client(self.retry.clone())
    }

    fn create_with_provider(&self, provider: Provider) -> Result<Box<dyn LLMClient>> {
        provider.create_client(self.retry.clone())
    }
}
