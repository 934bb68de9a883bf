//! Ingestion and retrieval over a vector store
//!
//! ```ignore
//! let pipeline = RetrievalPipeline::new(splitter, embedder, store, "ragchain");
//! pipeline.ingest(&text, "notes.txt").await?;
//! let hits = pipeline.similarity_search("What is an autoencoder?", 4, 0.0).await?;
//! ```

use crate::db::vectorstore::VectorStore;
use crate::llm::LLMClient;
use crate::prompts::PromptTemplate;
use crate::rag::chunker::TextSplitter;
use crate::rag::embeddings::Embedder;
use crate::types::{AppError, Result, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const ANSWER_TEMPLATE: &str = "Use the following context to answer the question. \
If the context does not contain the answer, say that you don't know.\n\n\
Context:\n{context}\n\nQuestion: {question}\nAnswer:";

const NO_CONTEXT: &str = "(no relevant context was found)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Chunks produced by the splitter
    pub chunks: usize,
    /// Vectors the store reports as written
    pub upserted: usize,
}

/// Model answer together with the retrieved passages it was given.
#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SearchResult>,
}

pub struct RetrievalPipeline {
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    min_score: f32,
}

impl RetrievalPipeline {
    pub fn new(
        splitter: TextSplitter,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            splitter,
            embedder,
            store,
            collection: collection.into(),
            min_score: 0.0,
        }
    }

    /// Score threshold used by [`RetrievalPipeline::search_many`] and [`RetrievalPipeline::answer`].
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Create the collection with the embedder's dimensions unless it exists.
    ///
    /// Returns `true` when a collection was created.
    pub async fn ensure_collection(&self) -> Result<bool> {
        if self.store.collection_exists(&self.collection).await? {
            return Ok(false);
        }
        self.store
            .create_collection(&self.collection, self.embedder.dimensions())
            .await?;
        Ok(true)
    }

    /// Split, embed and upsert `text`; chunk ids are `"{source}#{index}"`.
    pub async fn ingest(&self, text: &str, source: &str) -> Result<IngestReport> {
        let mut documents = self.splitter.split_documents(text, source)?;
        if documents.is_empty() {
            return Ok(IngestReport::default());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(AppError::Embedding(format!(
                "Expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }
        for (doc, embedding) in documents.iter_mut().zip(embeddings) {
            doc.embedding = Some(embedding);
        }

        let upserted = self.store.upsert(&self.collection, &documents).await?;
        info!(
            source,
            collection = %self.collection,
            chunks = documents.len(),
            upserted,
            "ingested document"
        );
        Ok(IngestReport {
            chunks: documents.len(),
            upserted,
        })
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed(query).await?;
        let results = self
            .store
            .search(&self.collection, &embedding, k, threshold)
            .await?;
        debug!(hits = results.len(), k, "similarity search");
        Ok(results)
    }

    /// Run several queries and merge hits by id, keeping each document's best score.
    ///
    /// Results are ordered by score, ties broken by id, and cut to `k`.
    pub async fn search_many(&self, queries: &[String], k: usize) -> Result<Vec<SearchResult>> {
        if queries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let embeddings = self.embedder.embed_batch(queries).await?;

        let mut best: HashMap<String, SearchResult> = HashMap::new();
        for embedding in &embeddings {
            let results = self
                .store
                .search(&self.collection, embedding, k, self.min_score)
                .await?;
            for result in results {
                match best.get(&result.document.id) {
                    Some(existing) if existing.score >= result.score => {}
                    _ => {
                        best.insert(result.document.id.clone(), result);
                    }
                }
            }
        }

        Ok(merge_ranked(best.into_values().collect(), k))
    }

    /// Answer `question` from the top `k` passages.
    ///
    /// The model is called even when nothing is retrieved; the prompt then says so.
    pub async fn answer(&self, llm: &dyn LLMClient, question: &str, k: usize) -> Result<Answer> {
        let sources = self.similarity_search(question, k, self.min_score).await?;
        let context = if sources.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            sources
                .iter()
                .map(|r| r.document.content.trim())
                .collect::<Vec<_>>()
                .join("\n---\n")
        };

        let template = PromptTemplate::new(ANSWER_TEMPLATE)?;
        let prompt = template.format(&HashMap::from([
            ("context".to_string(), context),
            ("question".to_string(), question.to_string()),
        ]))?;
        let answer = llm.generate(&prompt).await?.trim().to_string();

        Ok(Answer { answer, sources })
    }
}

/// Sort by score descending, then id, and keep the first `k`.
pub fn merge_ranked(mut results: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    results.truncate(k);
    results
}
