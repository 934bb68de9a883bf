//! Text embeddings
//!
//! [`Embedder`] turns text into vectors. [`OpenAIEmbedder`] calls an
//! OpenAI-compatible `/embeddings` endpoint, splitting large inputs into
//! batches and keeping a bounded number of batches in flight.

use crate::types::{AppError, Result};
use crate::utils::config::Config;
use crate::utils::retry::RetryPolicy;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }

    /// Embed every text; the output has one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    dimensions: usize,
    send_dimensions: bool,
    batch_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String, api_base: String, model: String, dimensions: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            dimensions,
            send_dimensions: false,
            batch_size: 64,
            concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }

    /// Build from configuration. Requires `OPENAI_API_KEY`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embeddings = &config.embeddings;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.llm.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            // Only the text-embedding-3 family accepts a `dimensions` parameter.
            send_dimensions: embeddings.model.starts_with("text-embedding-3"),
            ..Self::new(
                config.openai_api_key()?,
                config.llm.api_base.clone(),
                embeddings.model.clone(),
                embeddings.dimensions,
            )
        }
        .with_batching(embeddings.batch_size, embeddings.concurrency)
        .with_retry(RetryPolicy::from(&config.retry)))
    }

    /// Inputs per request and requests in flight; both are clamped to at least 1.
    pub fn with_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn embed_request(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.api_base);
        let body = EmbeddingRequest {
            model: &self.model,
            input: batch,
            dimensions: self.send_dimensions.then_some(self.dimensions),
        };
        debug!(model = %self.model, inputs = batch.len(), "embeddings request");

        let response = self
            .retry
            .send("OpenAI embeddings", || {
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            })
            .await
            .map_err(|e| AppError::Embedding(format!("Embeddings request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!(
                "Embeddings API error ({}): {}",
                status, text
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Embedding(format!("Invalid embeddings response: {}", e)))?;

        if parsed.data.len() != batch.len() {
            return Err(AppError::Embedding(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let owned: Vec<Vec<String>> = texts
            .chunks(self.batch_size)
            .map(<[String]>::to_vec)
            .collect();
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(owned)
            .map(|batch| async move { self.embed_request(&batch).await })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
