//! Vector stores.
//!
//! - `pinecone` - Managed cloud service, spoken to over its REST API
//! - `InMemoryVectorStore` - Cosine similarity in process, for tests and offline runs

#![allow(missing_docs)]

// Vector store abstraction layer
pub mod vectorstore;

// Provider implementations
pub mod pinecone;

// Re-exports
pub use pinecone::PineconeStore;
pub use vectorstore::{
    CollectionInfo, CollectionStats, InMemoryVectorStore, VectorStore, VectorStoreProvider,
};
