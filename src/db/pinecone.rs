//! Pinecone vector database integration.
//!
//! Talks to Pinecone's REST API directly. Index management goes to the
//! control plane (`controller_url`); vectors are read and written on the
//! index's own data-plane host, which is either configured or discovered by
//! describing the index.
//!
//! A `VectorStore` collection is a Pinecone index. Document text and
//! metadata are stored in the vector's metadata, the text under `text`.
//!
//! ```rust,ignore
//! use ragchain::db::PineconeStore;
//!
//! let store = PineconeStore::new(api_key, "us-east-1".into(), config.pinecone.clone())?;
//! store.create_collection("ragchain", 1536).await?;
//! store.upsert("ragchain", &documents).await?;
//! let results = store.search("ragchain", &query_embedding, 4, 0.0).await?;
//! ```

use crate::db::vectorstore::{CollectionInfo, CollectionStats, VectorStore};
use crate::types::{AppError, Document, DocumentMetadata, Result, SearchResult};
use crate::utils::config::PineconeConfig;
use crate::utils::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub const API_VERSION: &str = "2024-07";
/// Pinecone accepts at most this many vectors per upsert request.
pub const UPSERT_BATCH_SIZE: usize = 100;
/// Metadata key holding the document text.
pub const TEXT_KEY: &str = "text";

const READY_POLL_ATTEMPTS: u32 = 60;

// ============= Wire Types =============

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Debug, Deserialize)]
struct FetchedVector {
    id: String,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    total_vector_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: usize,
}

// ============= Metadata Mapping =============

/// Flatten a document into Pinecone metadata (strings, numbers and string lists only).
pub(crate) fn to_metadata(doc: &Document) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert(TEXT_KEY.to_string(), json!(doc.content));
    metadata.insert("title".to_string(), json!(doc.metadata.title));
    metadata.insert("source".to_string(), json!(doc.metadata.source));
    metadata.insert(
        "created_at".to_string(),
        json!(doc.metadata.created_at.to_rfc3339()),
    );
    if !doc.metadata.tags.is_empty() {
        metadata.insert("tags".to_string(), json!(doc.metadata.tags));
    }
    if let Some(index) = doc.metadata.chunk_index {
        metadata.insert("chunk_index".to_string(), json!(index));
    }
    metadata
}

/// Rebuild a document from Pinecone metadata; missing fields get empty defaults.
pub(crate) fn from_metadata(
    id: String,
    metadata: Option<Map<String, Value>>,
    embedding: Option<Vec<f32>>,
) -> Document {
    let metadata = metadata.unwrap_or_default();
    let text = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let created_at = metadata
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let tags = metadata
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let chunk_index = metadata
        .get("chunk_index")
        .and_then(Value::as_f64)
        .map(|i| i as usize);

    Document {
        id,
        content: text(TEXT_KEY),
        metadata: DocumentMetadata {
            title: text("title"),
            source: text("source"),
            created_at,
            tags,
            chunk_index,
        },
        embedding,
    }
}

/// `[("source", "a.txt")]` becomes `{"source": {"$eq": "a.txt"}}`.
///
/// Clauses match the metadata written by [`to_metadata`]: `chunk_index` is
/// compared as a number and `tag`/`tags` test membership in the tag list.
pub(crate) fn build_filter(filters: &[(String, String)]) -> Option<Value> {
    if filters.is_empty() {
        return None;
    }
    let clauses: Map<String, Value> = filters
        .iter()
        .map(|(field, value)| match field.as_str() {
            "tag" | "tags" => ("tags".to_string(), json!({ "$in": [value] })),
            "chunk_index" => {
                let operand = value
                    .parse::<u64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| json!(value));
                (field.clone(), json!({ "$eq": operand }))
            }
            _ => (field.clone(), json!({ "$eq": value })),
        })
        .collect();
    Some(Value::Object(clauses))
}

fn with_scheme(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

// ============= Store =============

/// Pinecone-backed [`VectorStore`].
pub struct PineconeStore {
    client: Client,
    api_key: String,
    environment: String,
    settings: PineconeConfig,
    /// Data-plane hosts resolved so far, by index name
    hosts: RwLock<HashMap<String, String>>,
    retry: RetryPolicy,
    ready_poll_interval: Duration,
}

impl PineconeStore {
    pub fn new(api_key: String, environment: String, settings: PineconeConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "Pinecone API key must not be empty".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            environment,
            settings,
            hosts: RwLock::new(HashMap::new()),
            retry: RetryPolicy::default(),
            ready_poll_interval: Duration::from_secs(1),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// How long to wait between readiness checks after creating an index.
    pub fn with_ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll_interval = interval;
        self
    }

    fn controller_url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.settings.controller_url.trim_end_matches('/'),
            path
        )
    }

    async fn send(
        &self,
        label: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        debug!(%method, url, "pinecone request");
        self.retry
            .send(label, || {
                let request = self
                    .client
                    .request(method.clone(), url)
                    .header("Api-Key", &self.api_key)
                    .header("X-Pinecone-API-Version", API_VERSION);
                match body {
                    Some(body) => request.json(body),
                    None => request,
                }
            })
            .await
            .map_err(|e| AppError::VectorStore(format!("{} failed: {}", label, e)))
    }

    async fn expect_success(label: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound(format!("{}: {}", label, body)),
            StatusCode::CONFLICT => {
                AppError::InvalidInput(format!("{}: already exists: {}", label, body))
            }
            _ => AppError::VectorStore(format!("{} failed ({}): {}", label, status, body)),
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(label: &str, response: Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| AppError::VectorStore(format!("{}: invalid response: {}", label, e)))
    }

    async fn describe(&self, name: &str) -> Result<IndexDescription> {
        let url = self.controller_url(&format!("/indexes/{}", name));
        let response = self.send("describe index", Method::GET, &url, None).await?;
        let response = Self::expect_success("describe index", response).await?;
        Self::parse("describe index", response).await
    }

    /// Data-plane base URL for `index`: configured host first, then cache, then describe.
    async fn host_for(&self, index: &str) -> Result<String> {
        if index == self.settings.index_name {
            if let Some(host) = &self.settings.index_host {
                return Ok(with_scheme(host));
            }
        }
        if let Some(host) = self.hosts.read().get(index) {
            return Ok(host.clone());
        }

        let description = self.describe(index).await?;
        let host = description.host.filter(|h| !h.is_empty()).ok_or_else(|| {
            AppError::VectorStore(format!("Index '{}' has no host yet", index))
        })?;
        let host = with_scheme(&host);
        self.hosts.write().insert(index.to_string(), host.clone());
        Ok(host)
    }

    async fn data_plane(
        &self,
        label: &str,
        index: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.host_for(index).await?, path);
        let response = self.send(label, method, &url, body).await?;
        Self::expect_success(label, response).await
    }

    async fn wait_until_ready(&self, name: &str) -> Result<()> {
        for _ in 0..READY_POLL_ATTEMPTS {
            let description = self.describe(name).await?;
            if description.status.map(|s| s.ready).unwrap_or(false) {
                if let Some(host) = description.host.filter(|h| !h.is_empty()) {
                    self.hosts
                        .write()
                        .insert(name.to_string(), with_scheme(&host));
                }
                return Ok(());
            }
            tokio::time::sleep(self.ready_poll_interval).await;
        }
        Err(AppError::VectorStore(format!(
            "Index '{}' did not become ready",
            name
        )))
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn provider_name(&self) -> &'static str {
        "pinecone"
    }

    /// Create a serverless index in the configured cloud and region, then wait for it.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let body = json!({
            "name": name,
            "dimension": dimensions,
            "metric": self.settings.metric,
            "spec": {
                "serverless": {
                    "cloud": self.settings.cloud,
                    "region": self.environment,
                }
            }
        });
        let url = self.controller_url("/indexes");
        let response = self
            .send("create index", Method::POST, &url, Some(&body))
            .await?;
        Self::expect_success("create index", response).await?;
        info!(index = name, dimensions, "created Pinecone index");

        self.wait_until_ready(name).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let url = self.controller_url(&format!("/indexes/{}", name));
        let response = self.send("delete index", Method::DELETE, &url, None).await?;
        Self::expect_success("delete index", response).await?;
        self.hosts.write().remove(name);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let url = self.controller_url("/indexes");
        let response = self.send("list indexes", Method::GET, &url, None).await?;
        let response = Self::expect_success("list indexes", response).await?;
        let list: IndexList = Self::parse("list indexes", response).await?;

        Ok(list
            .indexes
            .into_iter()
            .map(|index| CollectionInfo {
                name: index.name,
                // The control plane does not report vector counts
                document_count: 0,
                dimensions: index.dimension,
            })
            .collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        match self.describe(name).await {
            Ok(_) => Ok(true),
            Err(AppError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        let response = self
            .data_plane(
                "describe index stats",
                name,
                Method::POST,
                "/describe_index_stats",
                Some(&json!({})),
            )
            .await?;
        let stats: IndexStats = Self::parse("describe index stats", response).await?;

        let document_count = match stats.namespaces.get(&self.settings.namespace) {
            Some(ns) => ns.vector_count,
            None if stats.namespaces.is_empty() => stats.total_vector_count,
            None => 0,
        };
        Ok(CollectionStats {
            name: name.to_string(),
            document_count,
            dimensions: stats.dimension,
            index_size_bytes: None,
            distance_metric: self.settings.metric.clone(),
        })
    }

    async fn upsert(&self, collection: &str, documents: &[Document]) -> Result<usize> {
        if let Some(doc) = documents.iter().find(|d| d.embedding.is_none()) {
            return Err(AppError::InvalidInput(format!(
                "Document '{}' is missing embedding",
                doc.id
            )));
        }

        let mut upserted = 0;
        for batch in documents.chunks(UPSERT_BATCH_SIZE) {
            let vectors: Vec<UpsertVector<'_>> = batch
                .iter()
                .filter_map(|doc| {
                    doc.embedding.as_deref().map(|values| UpsertVector {
                        id: &doc.id,
                        values,
                        metadata: to_metadata(doc),
                    })
                })
                .collect();
            let body = json!({
                "vectors": vectors,
                "namespace": self.settings.namespace,
            });

            let response = self
                .data_plane("upsert", collection, Method::POST, "/vectors/upsert", Some(&body))
                .await?;
            let result: UpsertResponse = Self::parse("upsert", response).await?;
            debug!(index = collection, count = result.upserted_count, "upserted batch");
            upserted += result.upserted_count;
        }

        info!(index = collection, upserted, "upsert finished");
        Ok(upserted)
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

    async fn search_with_filters(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
        filters: &[(String, String)],
    ) -> Result<Vec<SearchResult>> {
        let mut body = json!({
            "vector": embedding,
            "topK": limit,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": self.settings.namespace,
        });
        if let Some(filter) = build_filter(filters) {
            body["filter"] = filter;
        }

        let response = self
            .data_plane("query", collection, Method::POST, "/query", Some(&body))
            .await?;
        let parsed: QueryResponse = Self::parse("query", response).await?;

        let mut results: Vec<SearchResult> = parsed
            .matches
            .into_iter()
            .filter(|m| m.score >= threshold)
            .map(|m| SearchResult {
                score: m.score,
                document: from_metadata(m.id, m.metadata, None),
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }

    /// Pinecone does not report how many ids existed, so this returns `ids.len()`.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let body = json!({
            "ids": ids,
            "namespace": self.settings.namespace,
        });
        self.data_plane("delete", collection, Method::POST, "/vectors/delete", Some(&body))
            .await?;
        Ok(ids.len())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let host = self.host_for(collection).await?;
        let mut url = reqwest::Url::parse(&format!("{}/vectors/fetch", host))
            .map_err(|e| AppError::VectorStore(format!("Invalid index host: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("ids", id)
            .append_pair("namespace", &self.settings.namespace);

        let response = self
            .send("fetch", Method::GET, url.as_str(), None)
            .await?;
        let response = Self::expect_success("fetch", response).await?;
        let mut fetched: FetchResponse = Self::parse("fetch", response).await?;

        Ok(fetched
            .vectors
            .remove(id)
            .map(|v| from_metadata(v.id, v.metadata, Some(v.values))))
    }
}
