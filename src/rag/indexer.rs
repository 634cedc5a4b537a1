//! Per-document indexing pipeline: segment, embed, upsert.
//!
//! This component raises on failure; absorbing per-document errors into
//! batch outcomes is the workflow layer's job.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::embedder::EmbeddingService;
use super::segmenter::Segmenter;
use super::store::{IndexedRecord, VectorStore};
use crate::core::errors::ApiError;

/// How chunk record ids are derived from the document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkIdStyle {
    /// `"{document_id}_{i}"` for uploaded/extracted documents.
    Document,
    /// `"{document_id}_chunk_{i}"` for web-search pseudo-documents.
    WebPseudo,
}

impl ChunkIdStyle {
    pub fn record_id(&self, document_id: &str, index: usize) -> String {
        match self {
            ChunkIdStyle::Document => format!("{}_{}", document_id, index),
            ChunkIdStyle::WebPseudo => format!("{}_chunk_{}", document_id, index),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Value,
}

/// The assembled result of indexing one document. Embeddings are included
/// so callers that also need the vectors avoid a second embedding pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub document_id: String,
    pub chunks: Vec<IndexedChunk>,
}

pub struct Indexer {
    segmenter: Segmenter,
    embedder: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    collection: String,
    id_style: ChunkIdStyle,
}

impl Indexer {
    pub fn new(
        segmenter: Segmenter,
        embedder: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        collection: String,
        id_style: ChunkIdStyle,
    ) -> Self {
        Self {
            segmenter,
            embedder,
            store,
            collection,
            id_style,
        }
    }

    /// Segment, embed and store one document.
    ///
    /// A document that segments to zero chunks short-circuits: nothing is
    /// embedded or upserted and the returned record has no chunks.
    pub async fn process_document(
        &self,
        document_id: &str,
        text: &str,
        metadata: &Value,
    ) -> Result<IndexedDocument, ApiError> {
        let chunks = self.segmenter.segment(text);
        tracing::info!("document {} segmented into {} chunks", document_id, chunks.len());

        if chunks.is_empty() {
            tracing::warn!("document {} has 0 chunks, skipping embed/upsert", document_id);
            return Ok(IndexedDocument {
                document_id: document_id.to_string(),
                chunks: Vec::new(),
            });
        }

        let embeddings = self.embedder.embed(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(ApiError::Internal(format!(
                "embedded {} of {} chunks for document {}",
                embeddings.len(),
                chunks.len(),
                document_id
            )));
        }

        let records: Vec<IndexedRecord> = chunks
            .iter()
            .zip(embeddings.iter())
            .enumerate()
            .map(|(i, (content, embedding))| IndexedRecord {
                id: self.id_style.record_id(document_id, i),
                content: content.clone(),
                embedding: embedding.clone(),
                metadata: chunk_metadata(metadata, i),
            })
            .collect();

        self.store.upsert(&self.collection, &records).await?;
        tracing::info!("indexing complete for document {}", document_id);

        Ok(IndexedDocument {
            document_id: document_id.to_string(),
            chunks: records
                .into_iter()
                .enumerate()
                .map(|(i, record)| IndexedChunk {
                    chunk_index: i,
                    content: record.content,
                    embedding: record.embedding,
                    metadata: record.metadata,
                })
                .collect(),
        })
    }
}

/// Base metadata with `chunk_index` folded in. Non-object metadata is
/// wrapped rather than discarded.
fn chunk_metadata(base: &Value, index: usize) -> Value {
    match base {
        Value::Object(map) => {
            let mut merged = map.clone();
            merged.insert("chunk_index".to_string(), json!(index));
            Value::Object(merged)
        }
        Value::Null => json!({ "chunk_index": index }),
        other => json!({ "source": other, "chunk_index": index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EmbeddingConfig;
    use crate::testing::{CountingStore, MockEngine};

    fn indexer_with(store: Arc<CountingStore>, style: ChunkIdStyle) -> Indexer {
        let embedder = Arc::new(EmbeddingService::new(
            Arc::new(MockEngine::new(&["mock-embed"])),
            &EmbeddingConfig {
                model: "mock-embed".to_string(),
                dimension: 3,
                workers: 2,
            },
        ));
        Indexer::new(
            Segmenter::new(2, 50),
            embedder,
            store,
            "test_collection".to_string(),
            style,
        )
    }

    async fn verified(indexer: &Indexer) {
        indexer.embedder.verify_model().await.unwrap();
    }

    #[tokio::test]
    async fn zero_chunks_never_touch_the_store() {
        let store = Arc::new(CountingStore::default());
        let indexer = indexer_with(store.clone(), ChunkIdStyle::Document);
        verified(&indexer).await;

        let result = indexer
            .process_document("doc1", "", &json!({}))
            .await
            .unwrap();

        assert!(result.chunks.is_empty());
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn ids_and_metadata_are_deterministic() {
        let store = Arc::new(CountingStore::default());
        let indexer = indexer_with(store.clone(), ChunkIdStyle::Document);
        verified(&indexer).await;

        let text = "alpha beta gamma delta.\n\nepsilon zeta eta theta.";
        let metadata = json!({ "title": "Test Doc", "source": "unit" });

        indexer
            .process_document("doc1", text, &metadata)
            .await
            .unwrap();

        let records = store.records();
        assert!(!records.is_empty());
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.id, format!("doc1_{}", i));
            assert_eq!(record.metadata["title"], "Test Doc");
            assert_eq!(record.metadata["chunk_index"], json!(i));
        }
    }

    #[tokio::test]
    async fn web_pseudo_ids_use_chunk_infix() {
        let store = Arc::new(CountingStore::default());
        let indexer = indexer_with(store.clone(), ChunkIdStyle::WebPseudo);
        verified(&indexer).await;

        indexer
            .process_document("web-0", "some scraped page text here", &json!({}))
            .await
            .unwrap();

        let records = store.records();
        assert_eq!(records[0].id, "web-0_chunk_0");
    }

    #[tokio::test]
    async fn returned_document_carries_embeddings() {
        let store = Arc::new(CountingStore::default());
        let indexer = indexer_with(store, ChunkIdStyle::Document);
        verified(&indexer).await;

        let result = indexer
            .process_document("doc1", "one two three four five", &json!({}))
            .await
            .unwrap();

        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].embedding.len(), 3);
    }
}
