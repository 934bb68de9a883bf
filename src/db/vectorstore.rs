//! Vector Store Abstraction Layer
//!
//! Retrieval code talks to [`VectorStore`]; the backend is picked at runtime
//! through [`VectorStoreProvider`].
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            │               VectorStore Trait               │
//!            ├──────────────────────────────────────────────┤
//!            │ create_collection │ upsert │ search │ delete │
//!            └──────────────────────────────────────────────┘
//!                     ▲                          ▲
//!             ┌───────┴───────┐          ┌───────┴───────┐
//!             │   Pinecone    │          │   InMemory    │
//!             │ (REST, cloud) │          │ (tests, demo) │
//!             └───────────────┘          └───────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ragchain::db::vectorstore::{VectorStore, VectorStoreProvider};
//!
//! let store = VectorStoreProvider::pinecone(&config)?.create_store().await?;
//!
//! store.create_collection("documents", 1536).await?;
//! store.upsert("documents", &documents).await?;
//! let results = store.search("documents", &query_embedding, 4, 0.0).await?;
//! ```

use crate::types::{AppError, Document, Result, SearchResult};
use crate::utils::config::{Config, PineconeConfig, RetryConfig};
use crate::utils::retry::RetryPolicy;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Vector Store Provider Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum VectorStoreProvider {
    /// A collection maps to a Pinecone index.
    Pinecone {
        api_key: String,
        /// Region new serverless indexes are created in.
        environment: String,
        settings: PineconeConfig,
        retry: RetryConfig,
    },
    InMemory,
}

impl VectorStoreProvider {
    /// Create a vector store instance from this provider configuration.
    pub async fn create_store(&self) -> Result<Box<dyn VectorStore>> {
        match self {
            VectorStoreProvider::Pinecone {
                api_key,
                environment,
                settings,
                retry,
            } => {
                let store = super::pinecone::PineconeStore::new(
                    api_key.clone(),
                    environment.clone(),
                    settings.clone(),
                )?
                .with_retry(RetryPolicy::from(retry));
                Ok(Box::new(store))
            }

            VectorStoreProvider::InMemory => Ok(Box::new(InMemoryVectorStore::new())),
        }
    }

    /// Pinecone provider; fails when `PINECONE_API_KEY` or `PINECONE_ENV` is missing.
    pub fn pinecone(config: &Config) -> Result<Self> {
        let credentials = config.pinecone_credentials()?;
        Ok(VectorStoreProvider::Pinecone {
            api_key: credentials.api_key,
            environment: credentials.environment,
            settings: config.pinecone.clone(),
            retry: config.retry.clone(),
        })
    }

    /// Pinecone when its credentials are configured, otherwise the in-memory store.
    pub fn from_config(config: &Config) -> Self {
        match Self::pinecone(config) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!("{}; falling back to the in-memory vector store", e);
                VectorStoreProvider::InMemory
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VectorStoreProvider::Pinecone { .. } => "pinecone",
            VectorStoreProvider::InMemory => "in-memory",
        }
    }
}

// ============================================================================
// Collection Statistics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub document_count: usize,
    pub dimensions: usize,
    pub index_size_bytes: Option<u64>,
    /// e.g. "cosine"
    pub distance_metric: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub document_count: usize,
    pub dimensions: usize,
}

// ============================================================================
// Vector Store Trait
// ============================================================================

/// Vector database operations used by the retrieval pipeline.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Fails if the collection already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats>;

    /// Insert or overwrite documents by `id`. Every document needs an embedding.
    async fn upsert(&self, collection: &str, documents: &[Document]) -> Result<usize>;

    /// Up to `limit` hits scoring at least `threshold`, best first.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Like [`search`](Self::search), restricted to documents whose metadata
    /// matches every `(field, value)` pair. Ignores the filters unless overridden.
    async fn search_with_filters(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
        _filters: &[(String, String)],
    ) -> Result<Vec<SearchResult>> {
        self.search(collection, embedding, limit, threshold).await
    }

    /// Returns how many documents were removed.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    async fn count(&self, collection: &str) -> Result<usize> {
        let stats = self.collection_stats(collection).await?;
        Ok(stats.document_count)
    }
}

// ============================================================================
// In-Memory Vector Store (for testing)
// ============================================================================

/// Unpersisted store scored by cosine similarity.
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, InMemoryCollection>>>,
}

struct InMemoryCollection {
    dimensions: usize,
    documents: HashMap<String, Document>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }

    fn matches_filter(doc: &Document, field: &str, value: &str) -> bool {
        match field {
            "source" => doc.metadata.source == value,
            "title" => doc.metadata.title == value,
            "tag" | "tags" => doc.metadata.tags.iter().any(|t| t == value),
            "chunk_index" => doc
                .metadata
                .chunk_index
                .map(|i| i.to_string() == value)
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(AppError::InvalidInput(format!(
                "Collection '{}' already exists",
                name
            )));
        }
        collections.insert(
            name.to_string(),
            InMemoryCollection {
                dimensions,
                documents: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        collections
            .remove(name)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", name)))?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read();
        Ok(collections
            .iter()
            .map(|(name, col)| CollectionInfo {
                name: name.clone(),
                document_count: col.documents.len(),
                dimensions: col.dimensions,
            })
            .collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read();
        Ok(collections.contains_key(name))
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        let collections = self.collections.read();
        let col = collections
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", name)))?;

        Ok(CollectionStats {
            name: name.to_string(),
            document_count: col.documents.len(),
            dimensions: col.dimensions,
            index_size_bytes: None,
            distance_metric: "cosine".to_string(),
        })
    }

    async fn upsert(&self, collection: &str, documents: &[Document]) -> Result<usize> {
        let mut collections = self.collections.write();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        if let Some(doc) = documents.iter().find(|doc| doc.embedding.is_none()) {
            return Err(AppError::InvalidInput(format!(
                "Document '{}' is missing embedding",
                doc.id
            )));
        }
        for doc in documents {
            col.documents.insert(doc.id.clone(), doc.clone());
        }

        Ok(documents.len())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        self.search_with_filters(collection, embedding, limit, threshold, &[])
            .await
    }

    /// Filters match exactly on `source`, `title`, `chunk_index`, or any tag via `tag`.
    async fn search_with_filters(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
        filters: &[(String, String)],
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read();
        let col = collections
            .get(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        let mut results: Vec<SearchResult> = col
            .documents
            .values()
            .filter(|doc| {
                filters
                    .iter()
                    .all(|(field, value)| Self::matches_filter(doc, field, value))
            })
            .filter_map(|doc| {
                let doc_embedding = doc.embedding.as_ref()?;
                let score = Self::cosine_similarity(embedding, doc_embedding);
                if score >= threshold {
                    Some(SearchResult {
                        document: Document {
                            embedding: None, // Don't return embeddings in results
                            ..doc.clone()
                        },
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        // Sort by score descending, ties by id so results are deterministic
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize> {
        let mut collections = self.collections.write();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        let mut count = 0;
        for id in ids {
            if col.documents.remove(id).is_some() {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read();
        let col = collections
            .get(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        Ok(col.documents.get(id).cloned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, source: &str, embedding: Vec<f32>) -> Document {
        let mut doc = Document::new(format!("content of {}", id), source);
        doc.id = id.to_string();
        doc.embedding = Some(embedding);
        doc
    }

    async fn seeded_store() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();
        store
            .upsert(
                "test",
                &[
                    doc("doc1", "a.txt", vec![1.0, 0.0, 0.0]),
                    doc("doc2", "b.txt", vec![0.0, 1.0, 0.0]),
                    doc("doc3", "b.txt", vec![0.9, 0.1, 0.0]),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_inmemory_duplicate_collection_error() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 384).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
        assert!(store.create_collection("test", 384).await.is_err());
    }

    #[tokio::test]
    async fn test_inmemory_search_sorted_and_thresholded() {
        let store = seeded_store().await;
        let results = store
            .search("test", &[1.0, 0.0, 0.0], 10, 0.5)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, "doc1");
        assert_eq!(results[1].document.id, "doc3");
        assert!(results[0].score >= results[1].score);
        assert!(results[0].document.embedding.is_none());
    }

    #[tokio::test]
    async fn test_inmemory_search_with_filters() {
        let store = seeded_store().await;
        let filters = vec![("source".to_string(), "b.txt".to_string())];
        let results = store
            .search_with_filters("test", &[1.0, 0.0, 0.0], 10, 0.0, &filters)
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["doc3", "doc2"]);
    }

    #[tokio::test]
    async fn test_inmemory_upsert_requires_embedding() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();
        let missing = Document::new("no vector", "x");
        let err = store.upsert("test", &[missing]).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_inmemory_failed_upsert_writes_nothing() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();
        let batch = [
            doc("doc1", "a.txt", vec![1.0, 0.0, 0.0]),
            Document::new("no vector", "x"),
        ];

        assert!(store.upsert("test", &batch).await.is_err());
        assert_eq!(store.count("test").await.unwrap(), 0);
        assert!(store.get("test", "doc1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inmemory_delete_get_count() {
        let store = seeded_store().await;
        assert_eq!(store.count("test").await.unwrap(), 3);

        let retrieved = store.get("test", "doc1").await.unwrap().unwrap();
        assert_eq!(retrieved.content, "content of doc1");
        assert!(store.get("test", "nope").await.unwrap().is_none());

        let deleted = store
            .delete("test", &["doc1".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count("test").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_inmemory_missing_collection() {
        let store = InMemoryVectorStore::new();
        let err = store.search("ghost", &[1.0], 1, 0.0).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.delete_collection("ghost").await.is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((InMemoryVectorStore::cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(InMemoryVectorStore::cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert!((InMemoryVectorStore::cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(InMemoryVectorStore::cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_provider_from_config() {
        let config = Config::default();
        assert!(matches!(
            VectorStoreProvider::from_config(&config),
            VectorStoreProvider::InMemory
        ));
        assert!(VectorStoreProvider::pinecone(&config).is_err());

        let config = Config::default().with_credentials(
            None,
            Some("pc-key".into()),
            Some("us-east-1".into()),
        );
        let provider = VectorStoreProvider::from_config(&config);
        assert_eq!(provider.name(), "pinecone");
    }
}
