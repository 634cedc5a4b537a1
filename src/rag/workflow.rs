//! Batch ingestion workflows.
//!
//! Fan `Indexer::process_document` out over many documents concurrently.
//! A failing document never aborts its batch: the failure is absorbed into
//! that document's outcome marker and the rest proceed. Outcome order is
//! input order, regardless of completion order.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::indexer::{IndexedChunk, Indexer};
use crate::tools::extract::TextExtractor;
use crate::tools::search::SearchProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub document_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
}

/// A file to extract and index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub document_id: String,
    pub file_path: PathBuf,
    #[serde(default)]
    pub metadata: Value,
}

/// Per-document result of a batch run. `error` is set when this document
/// failed; the batch itself always completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub chunks: Vec<IndexedChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentOutcome {
    fn failed(document_id: String, error: String) -> Self {
        Self {
            document_id,
            chunks: Vec::new(),
            error: Some(error),
        }
    }
}

pub struct IngestionWorkflow {
    indexer: Arc<Indexer>,
}

impl IngestionWorkflow {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self { indexer }
    }

    /// Index a batch of documents concurrently. The result vector maps to
    /// the input vector by position.
    pub async fn index_documents(&self, documents: Vec<DocumentInput>) -> Vec<DocumentOutcome> {
        let tasks = documents.into_iter().map(|doc| {
            let indexer = self.indexer.clone();
            async move {
                match indexer
                    .process_document(&doc.document_id, &doc.text, &doc.metadata)
                    .await
                {
                    Ok(indexed) => DocumentOutcome {
                        document_id: indexed.document_id,
                        chunks: indexed.chunks,
                        error: None,
                    },
                    Err(e) => {
                        tracing::error!("failed to index document {}: {}", doc.document_id, e);
                        DocumentOutcome::failed(doc.document_id, e.to_string())
                    }
                }
            }
        });

        join_all(tasks).await
    }
}

/// Extracts text from files and runs them through the ingestion workflow.
pub struct ExtractionIndexingWorkflow {
    extractor: Arc<TextExtractor>,
    workflow: IngestionWorkflow,
}

impl ExtractionIndexingWorkflow {
    pub fn new(extractor: Arc<TextExtractor>, indexer: Arc<Indexer>) -> Self {
        Self {
            extractor,
            workflow: IngestionWorkflow::new(indexer),
        }
    }

    pub async fn process_files(&self, entries: Vec<FileEntry>) -> Vec<DocumentOutcome> {
        let tasks = entries.into_iter().map(|entry| {
            let extractor = self.extractor.clone();
            let indexer = self.workflow.indexer.clone();
            async move {
                let extraction = match extractor.extract(&entry.file_path).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!(
                            "extraction failed for {} ({}): {}",
                            entry.document_id,
                            entry.file_path.display(),
                            e
                        );
                        return DocumentOutcome::failed(entry.document_id, e.to_string());
                    }
                };

                let metadata = merge_metadata(&entry.metadata, &extraction.metadata);
                match indexer
                    .process_document(&entry.document_id, &extraction.text, &metadata)
                    .await
                {
                    Ok(indexed) => DocumentOutcome {
                        document_id: indexed.document_id,
                        chunks: indexed.chunks,
                        error: None,
                    },
                    Err(e) => {
                        tracing::error!("failed to index document {}: {}", entry.document_id, e);
                        DocumentOutcome::failed(entry.document_id, e.to_string())
                    }
                }
            }
        });

        join_all(tasks).await
    }
}

/// Searches the web, scrapes, and indexes the hits as pseudo-documents.
pub struct WebSearchIndexingWorkflow {
    search: Arc<dyn SearchProvider>,
    workflow: IngestionWorkflow,
    min_scraped_chars: usize,
}

impl WebSearchIndexingWorkflow {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        indexer: Arc<Indexer>,
        min_scraped_chars: usize,
    ) -> Self {
        Self {
            search,
            workflow: IngestionWorkflow::new(indexer),
            min_scraped_chars,
        }
    }

    /// Search for `query`, then chunk, embed and store every hit that has
    /// enough scraped text. Near-empty pages are dropped before indexing so
    /// they never pollute the collection.
    pub async fn search_and_index(
        &self,
        query: &str,
    ) -> Result<Vec<DocumentOutcome>, crate::core::errors::ApiError> {
        tracing::info!("starting web search for query: {}", query);
        let hits = self.search.search_and_scrape(query).await?;
        tracing::info!("got {} hits for query: {}", hits.len(), query);

        let documents: Vec<DocumentInput> = hits
            .into_iter()
            .filter(|hit| {
                if hit.raw_text.len() < self.min_scraped_chars {
                    tracing::warn!("skipping {} (too little text extracted)", hit.url);
                    false
                } else {
                    true
                }
            })
            .enumerate()
            .map(|(i, hit)| DocumentInput {
                document_id: format!("web-{}", i),
                text: hit.raw_text,
                metadata: json!({
                    "title": hit.title,
                    "url": hit.url,
                    "snippet": hit.snippet,
                }),
            })
            .collect();

        let outcomes = self.workflow.index_documents(documents).await;
        tracing::info!("completed indexing {} documents from web search", outcomes.len());
        Ok(outcomes)
    }
}

fn merge_metadata(base: &Value, extracted: &Value) -> Value {
    match (base, extracted) {
        (Value::Object(base), Value::Object(extra)) => {
            let mut merged = extra.clone();
            // Caller-supplied metadata wins over extracted metadata.
            for (key, value) in base {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (Value::Null, other) => other.clone(),
        (base, _) => base.clone(),
    }
}
