//! # ragchain
//!
//! Building blocks for prompt-driven applications over an OpenAI-compatible
//! chat model and a Pinecone vector index: prompt templates, chains, chat
//! memory, text splitting, embeddings, similarity search and a
//! keyword-triggered Python tool.
//!
//! ## Overview
//!
//! ragchain can be used in two ways:
//!
//! 1. **As a command-line tool** - Run the `ragchain` binary
//! 2. **As a library** - Import components into your own Rust project
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use ragchain::{Config, LLMClientFactory, LLMClientFactoryTrait};
//!
//! #[tokio::main]
//! async fn main() -> ragchain::Result<()> {
//!     let config = Config::load("ragchain.toml")?;
//!     let client = LLMClientFactory::from_config(&config)?.create_default()?;
//!     println!("{}", client.generate("What is an autoencoder?").await?);
//!     Ok(())
//! }
//! ```
//!
//! ### Chains
//!
//! ```rust,ignore
//! use ragchain::chains::{Chain, LLMChain, SimpleSequentialChain};
//! use ragchain::prompts::PromptTemplate;
//!
//! let explain = LLMChain::new(llm.clone(), PromptTemplate::new("Explain {concept}")?);
//! let simplify = LLMChain::new(llm, PromptTemplate::new("Explain like I'm five: {text}")?);
//! let overall = SimpleSequentialChain::new(vec![Arc::new(explain), Arc::new(simplify)])?;
//! let answer = overall.run("autoencoder").await?;
//! ```
//!
//! ### Retrieval
//!
//! ```rust,ignore
//! use ragchain::rag::{RetrievalPipeline, TextSplitter};
//!
//! let pipeline = RetrievalPipeline::new(TextSplitter::new(100, 0)?, embedder, store, "ragchain");
//! pipeline.ensure_collection().await?;
//! pipeline.ingest(&text, "notes.txt").await?;
//! let hits = pipeline.similarity_search("What is an autoencoder?", 4, 0.0).await?;
//! ```
//!
//! ## Modules
//!
//! - [`agents`] - Keyword router that sends compute requests through generated code
//! - [`chains`] - `LLMChain` and sequential composition
//! - [`cli`] - Command-line parsing and handlers
//! - [`db`] - Vector store trait, Pinecone and in-memory stores
//! - [`llm`] - LLM client trait and the OpenAI client
//! - [`memory`] - Windowed chat history
//! - [`prompts`] - Prompt templates
//! - [`rag`] - Chunking, embeddings, cache and the retrieval pipeline
//! - [`tools`] - Tool registry, Python REPL and calculator
//! - [`types`] - Common types and error handling
//! - [`utils`] - Configuration, logging and retry

#![warn(rustdoc::missing_crate_level_docs)]

/// Keyword-triggered tool routing.
pub mod agents;
/// Chains over prompt templates.
pub mod chains;
/// Command-line interface.
pub mod cli;
/// Vector stores (Pinecone, in-memory).
pub mod db;
/// LLM provider clients and abstractions.
pub mod llm;
/// Conversation memory.
pub mod memory;
/// Prompt templates.
pub mod prompts;
/// Retrieval Augmented Generation (RAG) components.
pub mod rag;
/// Built-in tools (Python REPL, calculator).
pub mod tools;
/// Core types (messages, documents, errors).
pub mod types;
/// Configuration, logging and retry utilities.
pub mod utils;

// Re-export commonly used types
pub use agents::{Agent, ToolRouter};
pub use chains::{Chain, LLMChain, SequentialChain, SimpleSequentialChain};
pub use db::{InMemoryVectorStore, PineconeStore, VectorStore, VectorStoreProvider};
pub use llm::client::LLMClientFactoryTrait;
pub use llm::{LLMClient, LLMClientFactory, LLMResponse, Provider};
pub use memory::ConversationMemory;
pub use prompts::PromptTemplate;
pub use rag::{Embedder, OpenAIEmbedder, RetrievalPipeline, TextSplitter};
pub use tools::registry::ToolRegistry;
pub use types::{AppError, Result};
pub use utils::config::Config;
