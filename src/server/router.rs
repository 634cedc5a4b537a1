use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{chat, collection, health, ingest};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/chat/models", get(chat::list_models))
        .route("/chat/sessions", post(chat::create_session))
        .route("/chat/:session_id/stream", post(chat::stream_chat))
        .route("/chat/:session_id", post(chat::answer))
        .route(
            "/chat/:session_id/history",
            get(chat::history).delete(chat::clear_history),
        )
        .route("/chat/:session_id/context", get(chat::context))
        .route("/ingest/files", post(ingest::ingest_files))
        .route("/ingest/texts", post(ingest::ingest_texts))
        .route(
            "/collection/metadata",
            get(collection::list_metadata),
        )
        .route("/collection", delete(collection::clear))
        .route(
            "/collection/documents/:document_id",
            delete(collection::delete_document),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
