//! VectorStore trait, the abstract interface over the vector index.
//!
//! Every operation is scoped to a named collection; collections are created
//! lazily on first access. Record ids are unique within a collection and
//! re-upserting an id replaces the record. Identity constraints live in the
//! store, not in the callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ApiError;

/// One embedded chunk as stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// Deterministic id, `"{document_id}_{chunk_index}"` (or
    /// `"{document_id}_chunk_{i}"` for web pseudo-documents).
    pub id: String,
    /// The chunk text.
    pub content: String,
    /// Embedding vector; same dimensionality across a collection.
    pub embedding: Vec<f32>,
    /// Source metadata plus `chunk_index`.
    pub metadata: Value,
}

/// A query match with its similarity score (higher = closer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub content: String,
    pub metadata: Value,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert records, replacing any that share an id with an existing
    /// record. Replacement is delete-then-insert, not an atomic swap.
    async fn upsert(&self, collection: &str, records: &[IndexedRecord]) -> Result<(), ApiError>;

    /// Return up to `k` records nearest to `embedding`, most similar first.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, ApiError>;

    /// Delete records by id; returns how many existed.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, ApiError>;

    /// List `(id, metadata)` pairs for collection introspection.
    async fn list_metadata(&self, collection: &str) -> Result<Vec<(String, Value)>, ApiError>;

    /// Remove every record in the collection; returns how many were removed.
    async fn clear(&self, collection: &str) -> Result<usize, ApiError>;
}
