//! Chat endpoints: SSE streaming, non-streaming answers, history and
//! context introspection.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub message: String,
}

pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let models = state.engine.list_models().await?;
    Ok(Json(json!({ "available_models": models })))
}

/// Mint a fresh session id. Sessions come into existence lazily on first
/// use; this just hands the client an id it cannot collide on.
pub async fn create_session() -> Json<Value> {
    Json(json!({ "session_id": uuid::Uuid::new_v4().to_string() }))
}

/// SSE chat: every increment becomes one `data:` frame. The stream ends by
/// closing; there is no terminator frame. A mid-generation failure arrives
/// as a final `[ERROR] ...` frame.
pub async fn stream_chat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (_, stream) = state
        .chat
        .stream_chat(&session_id, &request.model, &request.message)
        .await?;

    let events = ReceiverStream::new(stream).map(|increment| {
        let event = match increment {
            Ok(text) => Event::default().data(text),
            Err(e) => Event::default().data(format!("[ERROR] {}", e)),
        };
        Ok(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub async fn answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, ApiError> {
    let answer = state
        .chat
        .answer(&session_id, &request.model, &request.message)
        .await?;
    Ok(Json(json!({
        "content": answer.content,
        "source": answer.source,
    })))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    let turns = state.chat.sessions().history(&session_id);
    Json(json!({ "conversation": turns }))
}

pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    state.chat.sessions().reset(&session_id);
    Json(json!({ "message": "chat history and retrieved context cleared" }))
}

pub async fn context(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    match state.chat.sessions().context(&session_id) {
        Some(context) => Json(json!(context)),
        None => Json(json!({})),
    }
}
