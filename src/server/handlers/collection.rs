//! Collection lifecycle endpoints: introspection, full clears, and
//! per-document deletion by record-id prefix.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

fn collection(state: &AppState) -> &str {
    &state.config.vector_store.collection
}

pub async fn list_metadata(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let entries = state.store.list_metadata(collection(&state)).await?;
    let records: Vec<Value> = entries
        .into_iter()
        .map(|(id, metadata)| json!({ "id": id, "metadata": metadata }))
        .collect();
    Ok(Json(json!({ "records": records })))
}

pub async fn clear(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let removed = state.store.clear(collection(&state)).await?;
    Ok(Json(json!({
        "message": "all indexed records cleared",
        "removed": removed,
    })))
}

/// Delete every record belonging to one document. Record ids are derived
/// from the document id with an underscore separator, so the prefix match
/// covers both `{id}_{i}` and `{id}_chunk_{i}` forms.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let name = collection(&state);
    let prefix = format!("{}_", document_id);

    let ids: Vec<String> = state
        .store
        .list_metadata(name)
        .await?
        .into_iter()
        .map(|(id, _)| id)
        .filter(|id| id.starts_with(&prefix))
        .collect();

    if ids.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no records found for document {}",
            document_id
        )));
    }

    let removed = state.store.delete(name, &ids).await?;
    Ok(Json(json!({
        "message": format!("deleted document {}", document_id),
        "removed": removed,
    })))
}
