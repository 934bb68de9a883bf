//! LLM Provider Clients and Abstractions
//!
//! This module provides a unified interface for calling a generative model.
//! Callers depend on [`LLMClient`]; the concrete client is built from
//! configuration through [`Provider`] and [`LLMClientFactory`].
//!
//! # Example
//!
//! ```ignore
//! use ragchain::llm::{LLMClientFactory, LLMClientFactoryTrait};
//!
//! let factory = LLMClientFactory::from_config(&config)?;
//! let client = factory.create_default()?;
//!
//! let response = client.generate("What is 2+2?").await?;
//! println!("{}", response);
//! ```
//!
//! # Streaming
//!
//! `stream` returns a `Box<dyn Stream<Item = Result<String>> + Send + Unpin>`
//! yielding content deltas as they arrive.

/// Core LLM client trait, provider enum and factory.
pub mod client;
/// OpenAI-compatible Chat Completions client.
pub mod openai;

pub use client::{
    LLMClient, LLMClientFactory, LLMClientFactoryTrait, LLMResponse, ModelParams, Provider,
    TokenUsage,
};
pub use openai::OpenAIClient;
