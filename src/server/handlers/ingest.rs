//! Ingestion endpoints. Batches always complete; each document's outcome
//! carries its own error marker, and callers are expected to inspect them.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::rag::{DocumentInput, FileEntry};
use crate::state::AppState;

const MAX_BATCH_SIZE: usize = 64;

#[derive(Debug, Deserialize)]
pub struct FileBatch {
    pub documents: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TextBatch {
    pub documents: Vec<DocumentInput>,
}

fn validate_batch(ids: Vec<&str>) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Err(ApiError::BadRequest("empty document batch".to_string()));
    }
    if ids.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BadRequest(format!(
            "batch of {} exceeds the limit of {}",
            ids.len(),
            MAX_BATCH_SIZE
        )));
    }

    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ApiError::BadRequest(format!(
                "duplicate document id: {}",
                id
            )));
        }
    }
    Ok(())
}

pub async fn ingest_files(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<FileBatch>,
) -> Result<Json<Value>, ApiError> {
    validate_batch(batch.documents.iter().map(|d| d.document_id.as_str()).collect())?;

    let outcomes = state.extraction.process_files(batch.documents).await;
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();

    Ok(Json(json!({
        "indexed": outcomes.len() - failed,
        "failed": failed,
        "results": outcomes,
    })))
}

pub async fn ingest_texts(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<TextBatch>,
) -> Result<Json<Value>, ApiError> {
    validate_batch(batch.documents.iter().map(|d| d.document_id.as_str()).collect())?;

    let outcomes = state.ingestion.index_documents(batch.documents).await;
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();

    Ok(Json(json!({
        "indexed": outcomes.len() - failed,
        "failed": failed,
        "results": outcomes,
    })))
}
