use crate::llm::client::{LLMClient, LLMResponse, ModelParams, TokenUsage};
use crate::types::{AppError, Message, MessageRole, Result, ToolCall, ToolDefinition};
use crate::utils::retry::RetryPolicy;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// ============= Wire Types =============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    fn new(role: MessageRole, content: &str) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    r#type: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// One decoded line of a server-sent event stream
#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Content(String),
    Done,
}

/// Decode a single SSE line; comments, blank lines and empty deltas yield `None`.
pub(crate) fn parse_sse_line(line: &str) -> Result<Option<SseEvent>> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| AppError::LLM(format!("Malformed stream chunk: {}", e)))?;
    Ok(chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .reduce(|mut acc, part| {
            acc.push_str(&part);
            acc
        })
        .filter(|content| !content.is_empty())
        .map(SseEvent::Content))
}

/// Pop the next complete line off `buffer`; bytes after the last newline stay buffered.
pub(crate) fn next_line(buffer: &mut Vec<u8>) -> Option<Result<String>> {
    let newline = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=newline).collect();
    Some(
        String::from_utf8(line)
            .map_err(|e| AppError::LLM(format!("Stream line is not valid UTF-8: {}", e))),
    )
}

/// Decode tool-call arguments; an empty string means no arguments.
fn parse_arguments(name: &str, raw: &str) -> Result<serde_json::Value> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| {
        AppError::LLM(format!(
            "Malformed arguments for tool call '{}': {}",
            name, e
        ))
    })
}

/// Turn a non-2xx response into an `AppError::LLM`, keeping the provider's message.
async fn api_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    AppError::LLM(format!("OpenAI API error ({}): {}", status, message))
}

// ============= Client =============

pub struct OpenAIClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    params: ModelParams,
    retry: RetryPolicy,
}

impl OpenAIClient {
    pub fn new(api_key: String, api_base: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            params: ModelParams::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Apply sampling params; a timeout rebuilds the HTTP client.
    pub fn with_params(mut self, params: ModelParams) -> Result<Self> {
        if let Some(secs) = params.timeout_secs {
            self.client = Client::builder()
                .timeout(Duration::from_secs(secs))
                .build()
                .map_err(|e| {
                    AppError::Configuration(format!("Failed to build HTTP client: {}", e))
                })?;
        }
        self.params = params;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request<'a>(
        &'a self,
        messages: Vec<WireMessage>,
        tools: Option<Vec<WireTool<'a>>>,
        stream: bool,
    ) -> ChatCompletionRequest<'a> {
        let tool_choice = tools.as_ref().map(|_| "auto");
        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            tools,
            tool_choice,
            stream,
        }
    }

    async fn post(&self, body: &ChatCompletionRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(model = %self.model, messages = body.messages.len(), "chat completion request");

        let response = self
            .retry
            .send("OpenAI chat completion", || {
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(body)
            })
            .await
            .map_err(|e| AppError::LLM(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }

    async fn complete(&self, messages: Vec<WireMessage>) -> Result<String> {
        let response = self.post(&self.request(messages, None, false)).await?;
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Invalid OpenAI response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::LLM("No response from OpenAI".to_string()))
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(vec![WireMessage::new(MessageRole::User, prompt)])
            .await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.complete(vec![
            WireMessage::new(MessageRole::System, system),
            WireMessage::new(MessageRole::User, prompt),
        ])
        .await
    }

    async fn generate_with_history(&self, messages: &[Message]) -> Result<String> {
        if messages.is_empty() {
            return Err(AppError::InvalidInput(
                "Conversation history is empty".to_string(),
            ));
        }
        let wire = messages
            .iter()
            .map(|m| WireMessage::new(m.role, &m.content))
            .collect();
        self.complete(wire).await
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<LLMResponse> {
        let wire_tools = tools
            .iter()
            .map(|tool| WireTool {
                r#type: "function",
                function: WireFunction {
                    name: &tool.name,
                    description: &tool.description,
                    parameters: &tool.parameters,
                },
            })
            .collect();

        let body = self.request(
            vec![WireMessage::new(MessageRole::User, prompt)],
            Some(wire_tools),
            false,
        );
        let completion: ChatCompletionResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| AppError::LLM(format!("Invalid OpenAI response: {}", e)))?;

        let usage = completion
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLM("No response from OpenAI".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                Ok(ToolCall {
                    arguments: parse_arguments(&call.function.name, &call.function.arguments)?,
                    id: call.id,
                    name: call.function.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "unknown".to_string()),
            usage,
        })
    }

    async fn stream(
        &self,
        prompt: &str,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>> {
        let body = self.request(vec![WireMessage::new(MessageRole::User, prompt)], None, true);
        let mut bytes = self.post(&body).await?.bytes_stream();

        let result_stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(AppError::LLM(format!("Stream error: {}", e)));
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(line) = next_line(&mut buffer) {
                    match line.and_then(|line| parse_sse_line(&line)) {
                        Ok(Some(SseEvent::Content(content))) => yield Ok(content),
                        Ok(Some(SseEvent::Done)) => break 'outer,
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            break 'outer;
                        }
                    }
                }
            }
        };

        Ok(Box::new(Box::pin(result_stream)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            Some(SseEvent::Content("Hel".to_string()))
        );
    }

    #[test]
    fn test_parse_sse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), Some(SseEvent::Done));
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_next_line_waits_for_complete_multibyte_line() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n".as_bytes();
        // Split between the two bytes of 'é'.
        let (head, tail) = line.split_at(line.len() - 7);
        assert!(std::str::from_utf8(head).is_err());

        let mut buffer = head.to_vec();
        assert!(next_line(&mut buffer).is_none());
        buffer.extend_from_slice(tail);
        let decoded = next_line(&mut buffer).unwrap().unwrap();
        assert_eq!(
            parse_sse_line(&decoded).unwrap(),
            Some(SseEvent::Content("café".to_string()))
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_next_line_rejects_invalid_utf8() {
        let mut buffer = vec![b'd', 0xff, b'\n'];
        assert!(matches!(next_line(&mut buffer), Some(Err(AppError::LLM(_)))));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("t", "").unwrap(), serde_json::json!({}));
        assert_eq!(parse_arguments("t", r#"{"a":1}"#).unwrap()["a"], 1);
        let err = parse_arguments("calculator", "{not json").unwrap_err();
        assert!(err.to_string().contains("calculator"));
    }

    #[test]
    fn test_parse_sse_malformed() {
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[test]
    fn test_request_omits_unset_params() {
        let client = OpenAIClient::new("k".into(), "http://x/v1/".into(), "gpt".into());
        let body = client.request(vec![WireMessage::new(MessageRole::User, "hi")], None, false);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("temperature").is_none());
        assert!(json.get("tools").is_none());
        assert!(json.get("stream").is_none());
        assert_eq!(client.api_base, "http://x/v1");
    }

    #[test]
    fn test_request_includes_params() {
        let client = OpenAIClient::new("k".into(), "http://x".into(), "gpt".into()).with_params(
            ModelParams {
                temperature: Some(0.9),
                max_tokens: Some(64),
                timeout_secs: None,
            },
        )
        .unwrap();
        let body = client.request(vec![], None, true);
        let json = serde_json::to_value(&body).unwrap();

        assert!((json["temperature"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(json["max_tokens"], 64);
        assert_eq!(json["stream"], true);
    }
}
