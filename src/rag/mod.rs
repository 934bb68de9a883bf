//! Retrieval Augmented Generation (RAG) Pipeline
//!
//! # Module Structure
//!
//! - [`rag::chunker`](crate::rag::chunker) - Fixed-window and boundary-aware text splitting
//! - [`rag::embeddings`](crate::rag::embeddings) - `Embedder` trait and the OpenAI embeddings client
//! - [`rag::cache`](crate::rag::cache) - LRU embedding cache and `CachedEmbedder`
//! - [`rag::pipeline`](crate::rag::pipeline) - Ingestion, similarity search and answering
//!
//! # RAG Pipeline
//!
//! 1. **Ingestion** - Text is split into chunks and embedded
//! 2. **Storage** - Chunks and their vectors are upserted into the vector store
//! 3. **Retrieval** - The query is embedded and the nearest chunks are returned
//! 4. **Generation** - The model answers with the retrieved chunks as context
//!
//! # Example
//!
//! ```ignore
//! use ragchain::rag::{chunker::TextSplitter, pipeline::RetrievalPipeline};
//!
//! let splitter = TextSplitter::new(100, 0)?;
//! let pipeline = RetrievalPipeline::new(splitter, embedder, store, "ragchain");
//!
//! let report = pipeline.ingest(&document_text, "notes.txt").await?;
//! let results = pipeline.similarity_search("What is an autoencoder?", 4, 0.0).await?;
//! ```

pub mod cache;
pub mod chunker;
pub mod embeddings;
pub mod pipeline;

pub use cache::{CachedEmbedder, EmbeddingCache, LruEmbeddingCache};
pub use chunker::{ChunkingStrategy, TextSplitter};
pub use embeddings::{Embedder, OpenAIEmbedder};
pub use pipeline::{Answer, IngestReport, RetrievalPipeline};
